use std::path::{Path, PathBuf};
use tether_types::{TetherError, TetherResult};

/// Bytes to cut from the front of each file so every file fits `per_file` and the total
/// fits `global`. Oversized files are cut to the per-file cap first; any remaining excess is
/// spread across files in proportion to what they keep.
pub fn plan_rotation(sizes: &[u64], per_file: u64, global: u64) -> Vec<u64> {
    let mut trims: Vec<u64> = sizes.iter().map(|s| s.saturating_sub(per_file)).collect();
    let kept: Vec<u64> = sizes.iter().zip(&trims).map(|(s, t)| s - t).collect();

    let total: u128 = kept.iter().map(|&k| k as u128).sum();
    let global = global as u128;
    if total <= global {
        return trims;
    }

    let excess = total - global;
    for (trim, &keep) in trims.iter_mut().zip(&kept) {
        let keep = keep as u128;
        let share = (excess * keep).div_ceil(total).min(keep);
        *trim += share as u64;
    }
    trims
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimResult {
    pub bytes_removed: u64,
    pub lines_removed: u64,
}

/// Index where the kept tail starts: at least `want`, moved forward to a line boundary.
pub fn cut_point(data: &[u8], want: usize) -> usize {
    if want == 0 {
        return 0;
    }
    if want >= data.len() {
        return data.len();
    }
    if data[want - 1] == b'\n' {
        return want;
    }
    match data[want..].iter().position(|&b| b == b'\n') {
        Some(idx) => want + idx + 1,
        None => data.len(),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".rotate");
    path.with_file_name(name)
}

/// Drops at least `trim` leading bytes, writing the tail to a temp file that replaces the original.
pub async fn trim_front(path: &Path, trim: u64) -> TetherResult<TrimResult> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| TetherError::LogAccess(format!("Failed to read {:?}: {}", path, e)))?;

    let cut = cut_point(&data, usize::try_from(trim).unwrap_or(usize::MAX));
    if cut == 0 {
        return Ok(TrimResult {
            bytes_removed: 0,
            lines_removed: 0,
        });
    }

    let lines_removed = data[..cut].iter().filter(|&&b| b == b'\n').count() as u64;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &data[cut..])
        .await
        .map_err(|e| TetherError::LogAccess(format!("Failed to write {:?}: {}", tmp, e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| TetherError::LogAccess(format!("Failed to replace {:?}: {}", path, e)))?;

    Ok(TrimResult {
        bytes_removed: cut as u64,
        lines_removed,
    })
}
