use crate::config::StorageConfig;
use crate::error::Result;
use crate::models::ChapterLink;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

static FORBIDDEN_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\x00-\x1f\\/*?:"<>|]"#).unwrap());
static DOT_SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.\s]+").unwrap());

const CHAPTER_EXT: &str = "txt";
const CLAIM_EXT: &str = "txt.part";
const STAGING_EXT: &str = "tmp";

static NEXT_STAGING: AtomicU64 = AtomicU64::new(0);

/// Turns a chapter title into a filesystem-safe name fragment.
pub fn sanitize_title(title: &str) -> String {
    let stripped = FORBIDDEN_CHARS.replace_all(title, "");
    let collapsed = DOT_SPACE_RUNS.replace_all(&stripped, "_");
    if collapsed.is_empty() {
        "untitled".to_string()
    } else {
        collapsed.into_owned()
    }
}

/// Deterministic artifact identity: `{sequence:03}_{sanitized title}`.
pub fn chapter_identity(link: &ChapterLink) -> String {
    format!("{:03}_{}", link.sequence_index, sanitize_title(&link.title))
}

/// Renders the persisted chapter document.
pub fn render_chapter(title: &str, body: &str) -> String {
    format!("# {}\n\n{}\n", title, body)
}

pub struct StorageManager {
    config: StorageConfig,
}

impl StorageManager {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        Path::new(&self.config.output_dir)
    }

    pub fn images_dir(&self) -> &Path {
        Path::new(&self.config.images_dir)
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.output_dir()).await?;
        tokio::fs::create_dir_all(self.images_dir()).await?;
        Ok(())
    }

    pub fn chapter_path(&self, identity: &str) -> PathBuf {
        self.output_dir().join(format!("{}.{}", identity, CHAPTER_EXT))
    }

    fn claim_path(&self, identity: &str) -> PathBuf {
        self.output_dir().join(format!("{}.{}", identity, CLAIM_EXT))
    }

    pub async fn chapter_exists(&self, identity: &str) -> bool {
        tokio::fs::try_exists(self.chapter_path(identity))
            .await
            .unwrap_or(false)
    }

    /// Atomically claims a chapter for this worker.
    ///
    /// The claim file is published fully written (holding the owner's pid)
    /// with a hard link, so it is never observed empty. Returns `None` when
    /// the chapter is already persisted or another worker holds the claim.
    pub async fn claim(&self, identity: &str) -> Result<Option<ChapterClaim>> {
        if self.chapter_exists(identity).await {
            return Ok(None);
        }

        let claim_path = self.claim_path(identity);
        let owner = std::process::id();
        let staged = self.private_path(identity);
        tokio::fs::write(&staged, owner.to_string()).await?;
        let linked = tokio::fs::hard_link(&staged, &claim_path).await;
        let _ = tokio::fs::remove_file(&staged).await;

        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Chapter {} is claimed by another worker", identity);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let claim = ChapterClaim {
            claim_path,
            final_path: self.chapter_path(identity),
            staging_path: self.private_path(identity),
            owner,
        };

        // Another run may have published between the existence check and the link.
        if self.chapter_exists(identity).await {
            claim.release().await?;
            return Ok(None);
        }
        Ok(Some(claim))
    }

    /// Removes claim and staging files whose owning process is gone. Claims
    /// held by a live process, including this one, are left alone.
    pub async fn clear_stale_claims(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(self.output_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let owner = if name.ends_with(&format!(".{}", CLAIM_EXT)) {
                tokio::fs::read_to_string(entry.path())
                    .await
                    .ok()
                    .and_then(|content| parse_pid(&content))
            } else if let Some(stem) = name.strip_suffix(&format!(".{}", STAGING_EXT)) {
                stem.rsplit_once('.')
                    .and_then(|(_, tag)| tag.split('-').next())
                    .and_then(parse_pid)
            } else {
                continue;
            };

            if owner.is_some_and(process_alive) {
                debug!("Keeping {} (owner still running)", name);
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if removed > 0 {
            info!("Removed {} stale chapter claim(s)", removed);
        }
        Ok(removed)
    }

    /// A file name no other worker or run will pick.
    fn private_path(&self, identity: &str) -> PathBuf {
        let seq = NEXT_STAGING.fetch_add(1, Ordering::Relaxed);
        self.output_dir().join(format!(
            "{}.{}-{}.{}",
            identity,
            std::process::id(),
            seq,
            STAGING_EXT
        ))
    }

    pub fn image_path(&self, file_name: &str) -> PathBuf {
        self.images_dir().join(file_name)
    }

    /// Image files saved for the chapter with the given name prefix.
    pub async fn chapter_images(&self, prefix: &str) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.images_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if entry.file_type().await?.is_file() && is_image_of(prefix, &name.to_string_lossy()) {
                found.push(entry.path());
            }
        }

        found.sort();
        Ok(found)
    }

    /// Deletes images already saved for a chapter that did not complete.
    pub async fn remove_chapter_images(&self, prefix: &str) -> Result<usize> {
        let images = self.chapter_images(prefix).await?;
        for path in &images {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Failed to remove orphaned image {:?}: {}", path, e);
            }
        }
        Ok(images.len())
    }
}

/// `{prefix}_{ordinal}{ext}` where ordinal is all digits.
fn is_image_of(prefix: &str, file_name: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('_'))
    else {
        return false;
    };
    let stem = rest.split('.').next().unwrap_or("");
    !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit())
}

fn parse_pid(text: &str) -> Option<u32> {
    text.trim().parse::<i32>().ok().filter(|pid| *pid > 0).map(|pid| pid as u32)
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }

    #[cfg(target_os = "linux")]
    let alive = Path::new("/proc").join(pid.to_string()).exists();

    #[cfg(all(unix, not(target_os = "linux")))]
    let alive = std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true);

    #[cfg(not(unix))]
    let alive = true;

    alive
}

/// Exclusive right to write one chapter artifact.
pub struct ChapterClaim {
    claim_path: PathBuf,
    final_path: PathBuf,
    staging_path: PathBuf,
    owner: u32,
}

impl ChapterClaim {
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Writes the document to a private file and publishes it under its
    /// final name. An artifact that already exists is never replaced.
    pub async fn commit(self, contents: &str) -> Result<PathBuf> {
        let written = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.staging_path)
                .await?;
            file.write_all(contents.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        let published = match written {
            Ok(()) => tokio::fs::hard_link(&self.staging_path, &self.final_path).await,
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&self.staging_path).await;
        self.drop_claim_file().await;

        match published {
            Ok(()) => Ok(self.final_path),
            Err(e) => Err(e.into()),
        }
    }

    /// Gives the chapter up without persisting anything.
    pub async fn release(self) -> Result<()> {
        self.drop_claim_file().await;
        Ok(())
    }

    /// Removes the claim file if it still names this process as owner.
    async fn drop_claim_file(&self) {
        let owned = tokio::fs::read_to_string(&self.claim_path)
            .await
            .ok()
            .and_then(|content| parse_pid(&content))
            == Some(self.owner);
        if owned {
            if let Err(e) = tokio::fs::remove_file(&self.claim_path).await {
                warn!("Failed to remove claim {:?}: {}", self.claim_path, e);
            }
        }
    }
}
