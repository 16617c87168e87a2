//! Best-effort removal of request files.
//!
//! Nothing here returns an error: failures are logged and swallowed.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use crate::{
    acquire::LocalSource,
    config::{CleanupConfig, Param, TelegramConfig},
    utils::redact_token,
};

/// Whether `path` is strictly inside `<cache_root>/<token>/`.
///
/// Comparison is component-wise, so a token that is a prefix of another
/// bot's token does not match. Paths with `.`/`..` components are refused
/// because they are not resolved here.
pub fn is_owned_cache_path(path: &Path, cache_root: &Path, token: &str) -> bool {
    if token.is_empty() || token == "." || token == ".." || token.contains(['/', '\\']) {
        return false;
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return false;
    }
    match path.strip_prefix(cache_root.join(token)) {
        Ok(rest) => rest.components().next().is_some(),
        Err(_) => false,
    }
}

#[derive(Clone, Debug)]
pub struct CleanupPolicy {
    output: bool,
    local_source: bool,
    cache_root: PathBuf,
    token: String,
}

impl CleanupPolicy {
    pub fn new<C>(cfg: &C) -> Self
    where
        C: Param<CleanupConfig> + Param<TelegramConfig>,
    {
        let cleanup: CleanupConfig = cfg.param();
        let tg: TelegramConfig = cfg.param();
        Self {
            output: cleanup.output,
            local_source: cleanup.local_source,
            cache_root: tg.cache_root,
            token: tg.token,
        }
    }

    /// Delete the generated audio if output cleanup is on.
    pub async fn remove_output(&self, path: &Path) {
        if !self.output {
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::info!("Deleted file: {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => (),
            Err(e) => tracing::warn!("Failed to delete file {}: {e}", path.display()),
        }
    }

    /// Delete a source video from the shared Bot API cache.
    ///
    /// Returns true only if the file was actually removed.
    pub async fn remove_source(&self, source: &LocalSource) -> bool {
        if !source.in_shared_cache || !self.local_source {
            return false;
        }
        let path = source.path.as_path();
        if !is_owned_cache_path(path, &self.cache_root, &self.token) {
            tracing::warn!(
                "Skip deleting local source not under this bot's cache dir: {}",
                redact_token(&path.display().to_string(), &self.token)
            );
            return false;
        }
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => (),
            _ => return false,
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!("Deleted local source video: {}", path.display());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to delete local source {}: {e}", path.display());
                false
            }
        }
    }
}

/// Recursively remove a working directory. A missing directory is fine.
pub async fn remove_workdir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!("Removed working directory {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => (),
        Err(e) => tracing::warn!("Failed to remove working directory {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123:abc";

    fn policy(root: &Path, output: bool, local_source: bool) -> CleanupPolicy {
        CleanupPolicy {
            output,
            local_source,
            cache_root: root.to_path_buf(),
            token: TOKEN.into(),
        }
    }

    fn cached_file(root: &Path, token: &str, rel: &str) -> PathBuf {
        let path = root.join(token).join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"video").unwrap();
        path
    }

    mod owned_cache_path {
        use super::*;

        #[test]
        fn test_accepts_descendants() {
            let root = Path::new("/var/lib/telegram-bot-api");
            assert!(is_owned_cache_path(
                Path::new("/var/lib/telegram-bot-api/123:abc/videos/abc.mp4"),
                root,
                TOKEN
            ));
            assert!(is_owned_cache_path(
                Path::new("/var/lib/telegram-bot-api/123:abc/file_1.mp4"),
                root,
                TOKEN
            ));
        }

        #[test]
        fn test_rejects_other_tokens() {
            let root = Path::new("/var/lib/telegram-bot-api");
            for p in [
                "/var/lib/telegram-bot-api/OTHER_TOKEN/file.mp4",
                "/var/lib/telegram-bot-api/123:abcd/videos/x.mp4",
                "/var/lib/telegram-bot-api/123:ab/videos/x.mp4",
                "/var/lib/telegram-bot-api/file.mp4",
            ] {
                assert!(!is_owned_cache_path(Path::new(p), root, TOKEN), "{p}");
            }
        }

        #[test]
        fn test_rejects_namespace_root_and_outside() {
            let root = Path::new("/var/lib/telegram-bot-api");
            assert!(!is_owned_cache_path(
                Path::new("/var/lib/telegram-bot-api/123:abc"),
                root,
                TOKEN
            ));
            assert!(!is_owned_cache_path(
                Path::new("/var/lib/telegram-bot-api/123:abc/"),
                root,
                TOKEN
            ));
            assert!(!is_owned_cache_path(Path::new("/tmp/123:abc/a.mp4"), root, TOKEN));
        }

        #[test]
        fn test_rejects_traversal() {
            let root = Path::new("/var/lib/telegram-bot-api");
            assert!(!is_owned_cache_path(
                Path::new("/var/lib/telegram-bot-api/123:abc/../OTHER/file.mp4"),
                root,
                TOKEN
            ));
        }

        #[test]
        fn test_rejects_degenerate_tokens() {
            let root = Path::new("/var/lib/telegram-bot-api");
            let p = Path::new("/var/lib/telegram-bot-api/x/file.mp4");
            assert!(!is_owned_cache_path(p, root, ""));
            assert!(!is_owned_cache_path(p, root, ".."));
            assert!(!is_owned_cache_path(p, root, "a/b"));
        }
    }

    #[tokio::test]
    async fn test_never_deletes_other_bot_cache() {
        let root = tempfile::tempdir().unwrap();
        let foreign = cached_file(root.path(), "OTHER_TOKEN", "file.mp4");
        let source = LocalSource {
            path: foreign.clone(),
            in_shared_cache: true,
        };

        assert!(!policy(root.path(), true, true).remove_source(&source).await);
        assert!(foreign.exists());
    }

    #[tokio::test]
    async fn test_deletes_own_cache_file() {
        let root = tempfile::tempdir().unwrap();
        let own = cached_file(root.path(), TOKEN, "videos/abc.mp4");
        let source = LocalSource {
            path: own.clone(),
            in_shared_cache: true,
        };

        assert!(policy(root.path(), true, true).remove_source(&source).await);
        assert!(!own.exists());
        // already gone, nothing to do
        assert!(!policy(root.path(), true, true).remove_source(&source).await);
    }

    #[tokio::test]
    async fn test_source_cleanup_disabled() {
        let root = tempfile::tempdir().unwrap();
        let own = cached_file(root.path(), TOKEN, "videos/abc.mp4");
        let source = LocalSource {
            path: own.clone(),
            in_shared_cache: true,
        };

        assert!(!policy(root.path(), true, false).remove_source(&source).await);
        assert!(own.exists());
    }

    #[tokio::test]
    async fn test_downloaded_source_left_to_workdir() {
        let root = tempfile::tempdir().unwrap();
        let own = cached_file(root.path(), TOKEN, "videos/abc.mp4");
        let source = LocalSource {
            path: own.clone(),
            in_shared_cache: false,
        };

        assert!(!policy(root.path(), true, true).remove_source(&source).await);
        assert!(own.exists());
    }

    #[tokio::test]
    async fn test_remove_output_respects_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("a.mp3");
        std::fs::write(&audio, b"id3").unwrap();

        policy(dir.path(), false, true).remove_output(&audio).await;
        assert!(audio.exists());
        policy(dir.path(), true, true).remove_output(&audio).await;
        assert!(!audio.exists());
        policy(dir.path(), true, true).remove_output(&audio).await;
    }

    #[tokio::test]
    async fn test_remove_workdir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("tg_v2a_x");
        std::fs::create_dir_all(workdir.join("nested")).unwrap();
        std::fs::write(workdir.join("nested/a.mp3"), b"id3").unwrap();

        remove_workdir(&workdir).await;
        assert!(!workdir.exists());
        remove_workdir(&workdir).await;
        assert!(!workdir.exists());
    }
}
