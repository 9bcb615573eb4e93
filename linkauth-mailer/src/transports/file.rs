use crate::{Email, Mailer, MailerError};
use async_trait::async_trait;
use lettre::{AsyncFileTransport, AsyncTransport, Tokio1Executor};
use std::path::{Path, PathBuf};

/// Writes every message as an `.eml` file into a directory. Meant for local
/// development and for the admin CLI.
pub struct FileTransport {
    transport: AsyncFileTransport<Tokio1Executor>,
    output_dir: PathBuf,
}

impl FileTransport {
    /// The directory is created if it does not exist yet.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self, MailerError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            transport: AsyncFileTransport::new(&output_dir),
            output_dir,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl std::fmt::Debug for FileTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTransport")
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

#[async_trait]
impl Mailer for FileTransport {
    async fn send_email(&self, email: Email) -> Result<(), MailerError> {
        let to = email.to.clone();
        let id = self.transport.send(email.into_message()?).await?;
        tracing::debug!(%to, id = %id, dir = %self.output_dir.display(), "Email written to file");
        Ok(())
    }
}
