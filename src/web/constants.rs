pub(crate) const DEFAULT_FIXED_EXTENSIONS: &[&str] = &["bat", "cmd", "com", "cpl", "exe", "scr", "js"];

/// Uploads are only stored when their extension is on this list.
pub(crate) const ALLOWED_EXTENSIONS: &[&str] = &[
    "csv", "txt", "gif", "png", "jpg", "jpeg", "bmp", "rar", "zip", "7zip", "doc", "docx", "xlsx",
    "ppt", "pptx", "pdf", "mp3", "mp4", "avi",
];

pub(crate) fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

pub(crate) const IGNORED_FILES: &[&str] = &[".gitignore"];

pub(crate) const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub(crate) const NOT_ALLOWED_MSG: &str = "File type not allowed";

pub(crate) const CSRF_TOKEN_MAX_AGE_SECS: u64 = 3600;

pub(crate) const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:5420";
