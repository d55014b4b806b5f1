use super::ApiError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Extensions accepted for document upload, matched case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx"];

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Email cannot be empty"));
    }

    // Deliberately loose: one '@' with something on each side. Delivery is
    // the real validator.
    let Some((local, domain)) = trimmed.split_once('@') else {
        return Err(ApiError::validation(format!("Invalid email: {trimmed}")));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ApiError::validation(format!("Invalid email: {trimmed}")));
    }

    Ok(trimmed)
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(password)
}

pub fn validate_limit(limit: u64) -> Result<u64, ApiError> {
    const MAX_LIMIT: u64 = 1000;
    const MIN_LIMIT: u64 = 1;

    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::validation(format!(
            "Invalid limit: {}. Limit must be between {} and {}",
            limit, MIN_LIMIT, MAX_LIMIT
        )));
    }
    Ok(limit)
}

/// Returns the lowercase extension if the file name and content type are
/// both acceptable.
pub fn validate_document_file(
    file_name: &str,
    content_type: Option<&str>,
) -> Result<String, ApiError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            ApiError::validation(format!(
                "Unsupported file type: {file_name}. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;

    if let Some(mime) = content_type
        && !mime.is_empty()
        && mime != "application/octet-stream"
        && !ALLOWED_MIME_TYPES.contains(&mime)
    {
        return Err(ApiError::validation(format!(
            "Unsupported content type: {mime}"
        )));
    }

    Ok(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("  padded@example.com  ").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn test_validate_limit() {
        assert!(validate_limit(1).is_ok());
        assert!(validate_limit(50).is_ok());
        assert!(validate_limit(1000).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(1001).is_err());
    }

    #[test]
    fn test_validate_document_file() {
        assert_eq!(
            validate_document_file("report.pdf", Some("application/pdf")).unwrap(),
            "pdf"
        );
        assert_eq!(validate_document_file("Notes.DOCX", None).unwrap(), "docx");
        assert!(validate_document_file("image.png", None).is_err());
        assert!(validate_document_file("noextension", None).is_err());
        assert!(validate_document_file("sheet.xlsx", Some("text/html")).is_err());
        // Browsers sometimes send octet-stream for office documents.
        assert!(
            validate_document_file("sheet.xlsx", Some("application/octet-stream")).is_ok()
        );
    }
}
