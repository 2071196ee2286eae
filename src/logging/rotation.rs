use flate2::write::GzEncoder;
use flate2::Compression;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

const ROTATION_CHECK_INTERVAL: u32 = 200;

/// A size-rotated, gzip-archived, cross-process-locked append log.
pub struct RotatingLogger {
    log_path: PathBuf,
    rotation_size_bytes: u64,
    max_archives: u32,
    write_count: AtomicU32,
}

impl RotatingLogger {
    pub fn new(log_path: PathBuf, rotation_size_mb: u64, max_archives: u32) -> Self {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self {
            log_path,
            rotation_size_bytes: rotation_size_mb * 1024 * 1024,
            max_archives,
            write_count: AtomicU32::new(0),
        }
    }

    pub fn write_with_rotation(&self, line: &str) -> Result<(), std::io::Error> {
        if self.write_count.fetch_add(1, Ordering::Relaxed) % ROTATION_CHECK_INTERVAL == 0 {
            let _ = self.rotate_if_needed();
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<(), std::io::Error> {
        if !self.needs_rotation()? {
            return Ok(());
        }

        let lock_path = self.log_path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                if self.needs_rotation()? {
                    self.perform_rotation()?;
                }
                let _ = std::fs::remove_file(&lock_path);
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    fn needs_rotation(&self) -> Result<bool, std::io::Error> {
        if !self.log_path.exists() {
            return Ok(false);
        }
        let metadata = std::fs::metadata(&self.log_path)?;
        Ok(metadata.len() >= self.rotation_size_bytes)
    }

    fn perform_rotation(&self) -> Result<(), std::io::Error> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = self
            .log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("netsentry.log")
            .to_string();
        let archive_name = format!("{filename}.{timestamp}.gz");
        let archive_path = self.log_path.parent().unwrap_or_else(|| std::path::Path::new(".")).join(archive_name);

        let temp_path = self.log_path.with_extension("rotating");
        std::fs::rename(&self.log_path, &temp_path)?;

        let source_file = File::open(&temp_path)?;
        let target_file = File::create(&archive_path)?;
        let mut encoder = GzEncoder::new(target_file, Compression::default());
        std::io::copy(&mut BufReader::new(source_file), &mut encoder)?;
        encoder.finish()?;
        std::fs::remove_file(&temp_path)?;

        let _ = self.cleanup_old_archives(&filename);
        Ok(())
    }

    fn cleanup_old_archives(&self, filename: &str) -> Result<(), std::io::Error> {
        let log_dir = match self.log_path.parent() {
            Some(p) => p,
            None => return Ok(()),
        };

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(log_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&format!("{filename}.")) && name.ends_with(".gz") {
                archives.push((entry.path(), entry.metadata()?.modified()?));
            }
        }

        archives.sort_by_key(|(_, modified)| *modified);
        if archives.len() > self.max_archives as usize {
            let remove_count = archives.len() - self.max_archives as usize;
            for (path, _) in archives.iter().take(remove_count) {
                let _ = std::fs::remove_file(path);
            }
        }
        Ok(())
    }
}
