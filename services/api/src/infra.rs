use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use gmf_forms::workflows::stamp_request::UploadedFile;
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

static UPLOAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Write one multipart file part under the OS temp directory. The staged
/// name keeps the original extension because the signature pipeline picks
/// its decode path from it; the browser-supplied filename survives only as
/// attachment metadata.
pub(crate) fn stage_upload(
    field: &str,
    original_filename: Option<String>,
    bytes: &[u8],
) -> std::io::Result<UploadedFile> {
    let sequence = UPLOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let extension = original_filename
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let staged_name = format!(
        "gmf-upload-{}-{}-{}{}",
        std::process::id(),
        sequence,
        field,
        extension
    );
    let filepath = std::env::temp_dir().join(staged_name);
    std::fs::write(&filepath, bytes)?;

    Ok(UploadedFile {
        original_filename,
        filepath,
    })
}
