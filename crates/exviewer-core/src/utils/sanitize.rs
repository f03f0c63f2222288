//! 路径净化工具

/// 从 URL 路径中取出可安全用作本地文件名的扩展名（含点号）
///
/// 没有扩展名或扩展名异常时返回空串。
pub fn sanitize_extension(url_path: &str) -> String {
    let file_name = url_path.rsplit('/').next().unwrap_or("");
    let ext = match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => &file_name[idx + 1..],
        _ => return String::new(),
    };

    if ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return String::new();
    }

    format!(".{}", ext.to_ascii_lowercase())
}
