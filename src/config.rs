use std::env;

pub const DEFAULT_BLOB_URL_TEMPLATE: &str = "/rails/active_storage/blobs/:signed_id/:filename";
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Options that shape editor behavior. Built with the `with_*` methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorConfig {
    /// Whether uploads, drops and file pastes are accepted.
    pub attachments: bool,
    /// Enter never inserts a paragraph and trailing line breaks are not added.
    pub single_line: bool,
    pub direct_upload_url: Option<String>,
    pub blob_url_template: String,
    pub history_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            attachments: true,
            single_line: false,
            direct_upload_url: None,
            blob_url_template: DEFAULT_BLOB_URL_TEMPLATE.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl EditorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with `QUIRE_NO_ATTACHMENTS` turning attachment support off.
    pub fn from_env() -> Self {
        let disabled = env::var("QUIRE_NO_ATTACHMENTS")
            .map(|value| !value.is_empty() && value != "0")
            .unwrap_or(false);
        Self::default().with_attachments(!disabled)
    }

    pub fn with_attachments(mut self, attachments: bool) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_single_line(mut self, single_line: bool) -> Self {
        self.single_line = single_line;
        self
    }

    pub fn with_direct_upload_url(mut self, url: impl Into<String>) -> Self {
        self.direct_upload_url = Some(url.into());
        self
    }

    pub fn with_blob_url_template(mut self, template: impl Into<String>) -> Self {
        self.blob_url_template = template.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = EditorConfig::new()
            .with_attachments(false)
            .with_single_line(true)
            .with_direct_upload_url("/uploads");

        assert!(!config.attachments);
        assert!(config.single_line);
        assert_eq!(config.direct_upload_url.as_deref(), Some("/uploads"));
        assert_eq!(config.blob_url_template, DEFAULT_BLOB_URL_TEMPLATE);
    }
}
