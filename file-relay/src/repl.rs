//! Interactive line client.
//!
//! Reads one command per line, runs it through a [`Client`] connected to
//! the coordinator and prints the outcome.  Downloads and archives are saved
//! into the configured download directory under the name the server
//! announced.  Refused commands are reported and the prompt returns; a
//! broken connection ends the loop.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::classify::FileClass;
use crate::client::{Client, Fetched};
use crate::command::Command;
use crate::error::{Error, ValidationError};
use crate::path::StoragePath;

const PROMPT: &str = "file-relay$ ";

/// Run the prompt loop until `input` is exhausted, `exit`/`quit` is typed,
/// or the connection fails.
pub async fn run<S, R, W>(
    client: &mut Client<S>,
    download_dir: &Path,
    input: R,
    mut output: W,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                output.write_all(format!("Invalid command: {e}\n").as_bytes()).await?;
                continue;
            }
        };
        match execute(client, download_dir, command).await {
            Ok(report) => output.write_all(report.as_bytes()).await?,
            Err(e) if e.is_terminal() => {
                output.write_all(format!("connection lost: {e}\n").as_bytes()).await?;
                output.flush().await?;
                return Err(e);
            }
            Err(e) => output.write_all(format!("error: {e}\n").as_bytes()).await?,
        }
    }
    output.flush().await?;
    Ok(())
}

/// Run one command and render what should be printed for it.
async fn execute<S>(client: &mut Client<S>, download_dir: &Path, command: Command) -> Result<String, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match command {
        Command::Upload {
            filename,
            destination,
        } => {
            let done = client.upload_file(Path::new(&filename), &destination).await?;
            Ok(format!("uploaded {filename}: {done}\n"))
        }
        Command::Download { path } => {
            let path = StoragePath::parse(&path, client.store())?;
            let fetched = client.download(&path).await?;
            let saved = save(download_dir, &fetched).await?;
            Ok(format!("downloaded {} ({} bytes)\n", saved.display(), fetched.bytes.len()))
        }
        Command::Delete { path } => {
            let path = StoragePath::parse(&path, client.store())?;
            let done = client.delete(&path).await?;
            Ok(format!("{done}\n"))
        }
        Command::Archive { marker } => {
            let class = FileClass::from_marker(&marker);
            if !class.is_supported() {
                return Err(ValidationError::UnsupportedExtension(marker).into());
            }
            let fetched = client.archive(class).await?;
            let saved = save(download_dir, &fetched).await?;
            Ok(format!("saved {} ({} bytes)\n", saved.display(), fetched.bytes.len()))
        }
        Command::List { path } => {
            let dir = StoragePath::parse(&path, client.store())?;
            let entries = client.list(&dir).await?;
            if entries.is_empty() {
                return Ok("(no files)\n".to_string());
            }
            let mut report = entries.join("\n");
            report.push('\n');
            Ok(report)
        }
    }
}

/// Write a fetched file into `dir` under its base name.
async fn save(dir: &Path, fetched: &Fetched) -> Result<PathBuf, Error> {
    let target = StoragePath::root().join(&fetched.name)?.resolve(dir);
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&target, &fetched.bytes).await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, Status};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::duplex;

    const TEST_TIMEOUT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn invalid_lines_never_reach_the_server() {
        let tmp = TempDir::new().unwrap();
        let (a, mut raw) = duplex(256);
        let mut client = Client::new(a, "smain", TEST_TIMEOUT);
        let mut out = Vec::new();

        run(&mut client, tmp.path(), &b"hello\n\ndtar .doc\nexit\n"[..], &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Invalid command"), "{printed}");
        assert!(printed.contains("unsupported file type: .doc"), "{printed}");

        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(50), raw.read(&mut buf)).await;
        assert!(read.is_err(), "nothing should have been sent");
    }

    #[tokio::test]
    async fn download_is_saved_under_the_announced_name() {
        let tmp = TempDir::new().unwrap();
        let (a, b) = duplex(1024);
        let mut client = Client::new(a, "smain", TEST_TIMEOUT);
        let server = tokio::spawn(async move {
            let mut codec = Codec::new(b, TEST_TIMEOUT);
            let line = codec.recv_command().await.unwrap().unwrap();
            codec.send_status(&Status::Ready("hello.c".into())).await.unwrap();
            codec.send_size(5).await.unwrap();
            codec.send_payload(b"int x").await.unwrap();
            line
        });

        let mut out = Vec::new();
        run(&mut client, tmp.path(), &b"dfile ~smain/src/hello.c\n"[..], &mut out)
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), "dfile ~/smain/src/hello.c");
        assert_eq!(std::fs::read(tmp.path().join("hello.c")).unwrap(), b"int x");
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("downloaded"), "{printed}");
    }

    #[tokio::test]
    async fn refusals_are_printed_and_the_loop_continues() {
        let tmp = TempDir::new().unwrap();
        let (a, b) = duplex(1024);
        let mut client = Client::new(a, "smain", TEST_TIMEOUT);
        tokio::spawn(async move {
            let mut codec = Codec::new(b, TEST_TIMEOUT);
            codec.recv_command().await.unwrap();
            codec.send_status(&Status::Failed("file a.c does not exist".into())).await.unwrap();
            codec.recv_command().await.unwrap();
            codec.send_status(&Status::Ready(String::new())).await.unwrap();
            codec.send_size(0).await.unwrap();
            codec.send_payload(b"").await.unwrap();
        });

        let mut out = Vec::new();
        run(&mut client, tmp.path(), &b"rmfile ~smain/a.c\ndisplay ~smain\n"[..], &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("error: rejected by peer: file a.c does not exist"), "{printed}");
        assert!(printed.contains("(no files)"), "{printed}");
    }
}
