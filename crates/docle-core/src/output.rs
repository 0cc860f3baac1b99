//! Caps the combined size of stdout and stderr.

/// Output after limiting. When truncation happens everything lands in
/// `stdout` and `stderr` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitedOutput {
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

pub struct OutputLimiter;

impl OutputLimiter {
    pub fn notice(total: usize, max_bytes: usize) -> String {
        format!(
            "\n\n... (output truncated: {} bytes exceeds limit of {} bytes)",
            total, max_bytes
        )
    }

    /// Returns the streams unchanged when `stdout.len() + stderr.len()` fits in
    /// `max_bytes`. Otherwise keeps a prefix of `stdout + stderr`, appends the
    /// truncation notice, and guarantees the result is at most `max_bytes`.
    /// The cut never splits a UTF-8 character.
    pub fn limit(stdout: String, stderr: String, max_bytes: usize) -> LimitedOutput {
        let total = stdout.len() + stderr.len();
        if total <= max_bytes {
            return LimitedOutput {
                stdout,
                stderr,
                truncated: false,
            };
        }

        let notice = Self::notice(total, max_bytes);
        let available = max_bytes.saturating_sub(notice.len());

        let mut combined = stdout;
        combined.push_str(&stderr);
        let mut cut = available.min(combined.len());
        while !combined.is_char_boundary(cut) {
            cut -= 1;
        }
        combined.truncate(cut);

        // A cap smaller than the notice itself still has to hold.
        if notice.len() <= max_bytes {
            combined.push_str(&notice);
        }

        log::debug!("Output truncated from {} to {} bytes", total, combined.len());
        LimitedOutput {
            stdout: combined,
            stderr: String::new(),
            truncated: true,
        }
    }
}
