//! Entry-point script writer
//!
//! Materializes `start.sh` in a container working directory: a `#!/bin/bash`
//! line followed by the requested commands, one per line, mode 0755.

use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const SCRIPT_NAME: &str = "start.sh";
const SHEBANG: &str = "#!/bin/bash";

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("cannot remove old script {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
    #[error("cannot write script {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

pub fn render_script(commands: &[String]) -> String {
    let mut lines = Vec::with_capacity(commands.len() + 1);
    lines.push(SHEBANG);
    lines.extend(commands.iter().map(String::as_str));
    lines.join("\n")
}

/// Replace `<working_dir>/start.sh` with a script running `commands`.
pub async fn write_entry_point(working_dir: &Path, commands: &[String]) -> Result<PathBuf, ScriptError> {
    let path = working_dir.join(SCRIPT_NAME);

    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!(path = %path.display(), "old entry point removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(ScriptError::Remove { path, source }),
    }

    let content = render_script(commands);
    if let Err(source) = write_executable(&path, content.as_bytes()).await {
        return Err(ScriptError::Write { path, source });
    }

    info!(path = %path.display(), commands = commands.len(), "entry point written");
    Ok(path)
}

async fn write_executable(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    options.mode(0o755);

    let mut file = options.open(path).await?;
    file.write_all(content).await?;
    file.flush().await?;
    Ok(())
}
