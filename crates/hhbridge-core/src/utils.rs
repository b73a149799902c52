//! Small helpers for payloads handed to the UI.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

/// Extensions picked when a MIME type maps to several
const PREFERRED_EXTENSIONS: [&str; 6] = ["jpg", "png", "gif", "webp", "pdf", "docx"];

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// MIME type without parameters: `image/jpeg; q=1` -> `image/jpeg`
pub fn mime_essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// File extension for a MIME type, if known
pub fn extension_for_mime(mime: &str) -> Option<String> {
    let mime = mime_essence(mime).to_ascii_lowercase();
    let extensions = mime_guess::get_mime_extensions_str(&mime)?;
    extensions
        .iter()
        .find(|ext| PREFERRED_EXTENSIONS.contains(ext))
        .or_else(|| extensions.first())
        .map(|ext| ext.to_string())
}

/// Link to a deal's page on the CRM portal behind `webhook_url`
pub fn deal_link(webhook_url: &str, deal_id: &str) -> Result<String, url::ParseError> {
    let origin = Url::parse(webhook_url)?.origin().ascii_serialization();
    Ok(format!("{}/crm/deal/details/{}/", origin, deal_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg").as_deref(), Some("jpg"));
        assert_eq!(extension_for_mime("image/png; charset=binary").as_deref(), Some("png"));
        assert_eq!(extension_for_mime("application/pdf").as_deref(), Some("pdf"));
        assert_eq!(extension_for_mime("application/x-not-a-type"), None);
    }

    #[test]
    fn test_deal_link() {
        assert_eq!(
            deal_link("https://crm.example.ru/rest/1/abc/", "17").unwrap(),
            "https://crm.example.ru/crm/deal/details/17/"
        );
        assert!(deal_link("not a url", "17").is_err());
    }

    #[test]
    fn test_encode_base64() {
        assert_eq!(encode_base64(b"hh"), "aGg=");
    }
}
