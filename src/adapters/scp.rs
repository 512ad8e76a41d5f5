//! Snapshot download over SSH using the sink side of the SCP protocol.
//!
//! The remote end runs `scp -f <file>`; we acknowledge with NUL bytes,
//! read the `C<mode> <size> <name>` header, then exactly `size` bytes of
//! content followed by a status byte.

use crate::config::Settings;
use crate::domain::ports::{ProgressFn, SnapshotFetcher};
use crate::utils::error::{CapatrossError, Result};
use async_trait::async_trait;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const BUF_SIZE: usize = 32 * 1024;
const MAX_CONTROL_LINE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpHeader {
    pub mode: u32,
    pub size: u64,
    pub name: String,
}

/// Parses a `C0644 1234 name` control record (without the trailing newline).
pub fn parse_control_line(line: &str) -> Result<ScpHeader> {
    let malformed = || CapatrossError::transfer(format!("Malformed scp header: {:?}", line));

    let rest = line.strip_prefix('C').ok_or_else(malformed)?;
    let mut parts = rest.splitn(3, ' ');
    let mode = parts
        .next()
        .and_then(|m| u32::from_str_radix(m, 8).ok())
        .ok_or_else(malformed)?;
    let size = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(malformed)?;
    let name = parts
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(malformed)?;

    Ok(ScpHeader {
        mode,
        size,
        name: name.to_string(),
    })
}

async fn read_control_line<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await.map_err(|e| {
            CapatrossError::transfer(format!("Connection closed before scp header: {}", e))
        })?;
        if byte == b'\n' {
            return Ok(line);
        }
        line.push(byte);
        if line.len() > MAX_CONTROL_LINE {
            return Err(CapatrossError::transfer("scp header too long"));
        }
    }
}

async fn read_ack<S: AsyncRead + Unpin>(stream: &mut S) -> Result<()> {
    match stream.read_u8().await? {
        0 => Ok(()),
        code => {
            let message = read_control_line(stream).await.unwrap_or_default();
            Err(CapatrossError::transfer(format!(
                "Remote scp reported {}: {}",
                if code == 1 { "a warning" } else { "an error" },
                String::from_utf8_lossy(&message).trim()
            )))
        }
    }
}

/// Runs the sink side of one file transfer over `stream`, writing the
/// content to `output`. Returns the number of bytes received.
pub async fn receive_file<S, W>(stream: &mut S, output: &mut W, progress: ProgressFn<'_>) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    stream.write_all(&[0]).await?;
    stream.flush().await?;

    let header = loop {
        let line = read_control_line(stream).await?;
        match line.first() {
            // modification times, sent with -p
            Some(b'T') => {
                stream.write_all(&[0]).await?;
                stream.flush().await?;
            }
            Some(1) | Some(2) => {
                return Err(CapatrossError::transfer(format!(
                    "Remote scp reported: {}",
                    String::from_utf8_lossy(&line[1..]).trim()
                )));
            }
            _ => break parse_control_line(&String::from_utf8_lossy(&line))?,
        }
    };
    tracing::debug!(
        "Receiving {} ({} bytes, mode {:o})",
        header.name,
        header.size,
        header.mode
    );

    stream.write_all(&[0]).await?;
    stream.flush().await?;

    let mut buf = vec![0u8; BUF_SIZE];
    let mut received: u64 = 0;
    progress(0, header.size);
    while received < header.size {
        let want = (header.size - received).min(BUF_SIZE as u64) as usize;
        let len = stream.read(&mut buf[..want]).await?;
        if len == 0 {
            return Err(CapatrossError::transfer(format!(
                "Connection closed after {} of {} bytes",
                received, header.size
            )));
        }
        output.write_all(&buf[..len]).await?;
        received += len as u64;
        progress(received, header.size);
    }
    output.flush().await?;

    read_ack(stream).await?;
    stream.write_all(&[0]).await?;
    stream.flush().await?;

    Ok(received)
}

pub fn scp_source_command(remote: &str) -> String {
    format!("scp -f {}", shell_escape::escape(Cow::Borrowed(remote)))
}

/// Downloads snapshots from the data host configured under `[getdata]`.
#[derive(Debug, Clone)]
pub struct ScpFetcher {
    host: String,
    port: u16,
    user: String,
    key_paths: Vec<PathBuf>,
}

impl ScpFetcher {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>, key_paths: Vec<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            key_paths,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let key_paths = match &settings.getdata.ssh_key {
            Some(path) => vec![path.clone()],
            None => {
                let ssh_dir = crate::config::settings::home_dir()?.join(".ssh");
                vec![ssh_dir.join("id_ed25519"), ssh_dir.join("id_rsa")]
            }
        };
        Ok(Self::new(
            settings.getdata.host.clone(),
            settings.getdata.port,
            settings.getdata.user.clone(),
            key_paths,
        ))
    }

    async fn download_to(&self, remote: &str, local: &Path, progress: ProgressFn<'_>) -> Result<u64> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local).await?;

        #[cfg(not(feature = "use-system-ssh"))]
        let received = {
            let mut session = ssh::SshSession::connect(self).await?;
            let mut stream = session.exec(&scp_source_command(remote)).await?;
            let received = receive_file(&mut stream, &mut file, progress).await;
            drop(stream);
            session.close().await;
            received?
        };

        #[cfg(feature = "use-system-ssh")]
        let received = {
            let mut child = self.system_ssh(&scp_source_command(remote)).spawn()?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| CapatrossError::transfer("ssh stdout unavailable"))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| CapatrossError::transfer("ssh stdin unavailable"))?;
            let mut stream = tokio::io::join(stdout, stdin);
            let received = receive_file(&mut stream, &mut file, progress).await;
            drop(stream);
            let status = child.wait().await?;
            let received = received?;
            if !status.success() {
                return Err(CapatrossError::transfer(format!("ssh exited with {}", status)));
            }
            received
        };

        Ok(received)
    }

    #[cfg(feature = "use-system-ssh")]
    fn system_ssh(&self, command: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("ssh");
        if let Some(key) = self.key_paths.iter().find(|p| p.exists()) {
            cmd.arg("-i").arg(key);
        }
        cmd.arg("-p")
            .arg(self.port.to_string())
            .arg(format!("{}@{}", self.user, self.host))
            .arg(command);
        cmd.kill_on_drop(true);
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd
    }
}

#[async_trait]
impl SnapshotFetcher for ScpFetcher {
    fn remote_host(&self) -> &str {
        &self.host
    }

    async fn fetch(&self, remote: &str, local: &Path, progress: ProgressFn<'_>) -> Result<u64> {
        tracing::info!(
            "Downloading {}@{}:{} ({}) to {}",
            self.user,
            self.host,
            self.port,
            remote,
            local.display()
        );
        let result = self.download_to(remote, local, progress).await;
        if result.is_err() {
            // never leave a truncated archive where importdata would pick it up
            let _ = tokio::fs::remove_file(local).await;
        }
        result
    }
}

#[cfg(not(feature = "use-system-ssh"))]
mod ssh {
    use super::ScpFetcher;
    use crate::utils::error::{CapatrossError, Result};
    use russh::client::{self, Handle, Handler};
    use russh::keys::key::PrivateKeyWithHashAlg;
    use russh::keys::ssh_key::PublicKey;
    use russh::Disconnect;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncWrite};

    pub struct Client {
        host: String,
        port: u16,
    }

    #[async_trait::async_trait]
    impl Handler for Client {
        type Error = russh::Error;

        async fn check_server_key(
            &mut self,
            server_public_key: &PublicKey,
        ) -> std::result::Result<bool, Self::Error> {
            let known_hosts = crate::config::settings::home_dir()
                .map(|home| home.join(".ssh").join("known_hosts"))
                .ok();
            if !known_hosts.map(|p| p.exists()).unwrap_or(false) {
                tracing::warn!("No known_hosts file, accepting host key for {}", self.host);
                return Ok(true);
            }

            match russh::keys::check_known_hosts(&self.host, self.port, server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    tracing::warn!("{} is not in known_hosts, accepting its host key", self.host);
                    Ok(true)
                }
                Err(e) => {
                    tracing::error!("Host key verification for {} failed: {}", self.host, e);
                    Ok(false)
                }
            }
        }
    }

    pub struct SshSession {
        handle: Handle<Client>,
    }

    impl SshSession {
        pub async fn connect(fetcher: &ScpFetcher) -> Result<Self> {
            let config = Arc::new(client::Config {
                inactivity_timeout: Some(Duration::from_secs(60)),
                keepalive_interval: Some(Duration::from_secs(15)),
                ..<_>::default()
            });
            let handler = Client {
                host: fetcher.host.clone(),
                port: fetcher.port,
            };

            let mut handle =
                client::connect(config, (fetcher.host.as_str(), fetcher.port), handler).await?;

            for key_path in fetcher.key_paths.iter().filter(|p| p.exists()) {
                let key_pair = match russh::keys::load_secret_key(key_path, None) {
                    Ok(key_pair) => key_pair,
                    Err(e) => {
                        tracing::warn!("Skipping SSH key {}: {}", key_path.display(), e);
                        continue;
                    }
                };
                tracing::debug!("Trying SSH key {}", key_path.display());
                let authenticated = handle
                    .authenticate_publickey(
                        fetcher.user.clone(),
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), None)?,
                    )
                    .await?;
                if authenticated {
                    return Ok(Self { handle });
                }
            }

            Err(CapatrossError::transfer(format!(
                "SSH authentication as {}@{} failed",
                fetcher.user, fetcher.host
            )))
        }

        pub async fn exec(&mut self, command: &str) -> Result<impl AsyncRead + AsyncWrite + Unpin> {
            let channel = self.handle.channel_open_session().await?;
            channel.exec(true, command.as_bytes()).await?;
            Ok(channel.into_stream())
        }

        pub async fn close(&mut self) {
            if let Err(e) = self
                .handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
            {
                tracing::debug!("SSH disconnect failed: {}", e);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::duplex;

    #[test]
    fn test_parse_control_line() {
        let header = parse_control_line("C0644 1048576 darmok_production.sql.gz").unwrap();
        assert_eq!(
            header,
            ScpHeader {
                mode: 0o644,
                size: 1048576,
                name: "darmok_production.sql.gz".to_string()
            }
        );

        let spaced = parse_control_line("C0600 3 name with spaces.gz").unwrap();
        assert_eq!(spaced.name, "name with spaces.gz");

        assert!(parse_control_line("D0755 0 dir").is_err());
        assert!(parse_control_line("C0644 lots file").is_err());
        assert!(parse_control_line("C0644 10").is_err());
    }

    #[test]
    fn test_scp_source_command_escapes_path() {
        assert_eq!(scp_source_command("/dumps/a.sql.gz"), "scp -f /dumps/a.sql.gz");
        assert_eq!(scp_source_command("/dumps/a b.gz"), "scp -f '/dumps/a b.gz'");
    }

    async fn fake_source(mut remote: tokio::io::DuplexStream, content: Vec<u8>) {
        assert_eq!(remote.read_u8().await.unwrap(), 0);
        remote
            .write_all(format!("C0644 {} dump.sql.gz\n", content.len()).as_bytes())
            .await
            .unwrap();
        assert_eq!(remote.read_u8().await.unwrap(), 0);
        remote.write_all(&content).await.unwrap();
        remote.write_all(&[0]).await.unwrap();
        assert_eq!(remote.read_u8().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_receive_file_reports_progress() {
        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let (mut local, remote) = duplex(8 * 1024);
        let server = tokio::spawn(fake_source(remote, content.clone()));

        let seen = Mutex::new(Vec::new());
        let progress = |sent: u64, total: u64| seen.lock().unwrap().push((sent, total));
        let mut output = Vec::new();

        let received = receive_file(&mut local, &mut output, &progress).await.unwrap();
        server.await.unwrap();

        assert_eq!(received, content.len() as u64);
        assert_eq!(output, content);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first(), Some(&(0, 100_000)));
        assert_eq!(seen.last(), Some(&(100_000, 100_000)));
    }

    #[tokio::test]
    async fn test_remote_error_is_reported() {
        let (mut local, mut remote) = duplex(1024);
        let server = tokio::spawn(async move {
            assert_eq!(remote.read_u8().await.unwrap(), 0);
            remote
                .write_all(b"\x01scp: /dumps/missing.gz: No such file or directory\n")
                .await
                .unwrap();
        });

        let mut output = Vec::new();
        let err = receive_file(&mut local, &mut output, &|_, _| {})
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(err.to_string().contains("No such file or directory"));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_transfer_fails() {
        let (mut local, mut remote) = duplex(1024);
        let server = tokio::spawn(async move {
            assert_eq!(remote.read_u8().await.unwrap(), 0);
            remote.write_all(b"C0644 10 dump.gz\n").await.unwrap();
            assert_eq!(remote.read_u8().await.unwrap(), 0);
            remote.write_all(b"12345").await.unwrap();
        });

        let mut output = Vec::new();
        let result = receive_file(&mut local, &mut output, &|_, _| {}).await;
        server.await.unwrap();

        assert!(matches!(result, Err(CapatrossError::TransferError { .. })));
    }
}
