//! Fans program stdout/stderr into tagged frames on the session's outgoing
//! channel.
//!
//! Each reader forwards a chunk as soon as it is read. Chunk boundaries are
//! not aligned to lines and there is no newline buffering: an interactive
//! prompt without a trailing newline must reach the client promptly.

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use runbox_protocol::Frame;

/// Fixed read size; the interleaving granularity across the two streams.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Spawn one reader task per output stream. Each task ends silently on EOF
/// or read error; the `exit` frame is the waiter's job.
pub fn spawn_output_readers<O, E>(
    stdout: O,
    stderr: E,
    tx: mpsc::Sender<Frame>,
) -> (JoinHandle<()>, JoinHandle<()>)
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let stdout_task = tokio::spawn(pump(stdout, stdout_frame, tx.clone()));
    let stderr_task = tokio::spawn(pump(stderr, stderr_frame, tx));
    (stdout_task, stderr_task)
}

fn stdout_frame(data: String) -> Frame {
    Frame::Stdout { data }
}

fn stderr_frame(data: String) -> Frame {
    Frame::Stderr { data }
}

async fn pump<R>(mut reader: R, make_frame: fn(String) -> Frame, tx: mpsc::Sender<Frame>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(make_frame(data)).await.is_err() {
                    // Session is gone; nobody is listening anymore.
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn prompt_without_newline_is_forwarded_immediately() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(pump(reader, stdout_frame, tx));

        // The writer stays open: the frame must not wait for EOF or '\n'.
        writer.write_all(b"Enter name: ").await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(
            frame,
            Frame::Stdout {
                data: "Enter name: ".to_string()
            }
        );

        drop(writer);
        task.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn large_output_is_chunked_and_reassembles_in_order() {
        let payload: String = "x".repeat(3 * READ_CHUNK_SIZE + 17);
        let (mut writer, reader) = tokio::io::duplex(8192);
        let (tx, mut rx) = mpsc::channel(64);
        let task = tokio::spawn(pump(reader, stdout_frame, tx));

        writer.write_all(payload.as_bytes()).await.unwrap();
        drop(writer);
        task.await.unwrap();

        let mut reassembled = String::new();
        while let Some(frame) = rx.recv().await {
            let Frame::Stdout { data } = frame else {
                panic!("unexpected frame: {frame:?}");
            };
            assert!(data.len() <= READ_CHUNK_SIZE);
            assert!(!data.is_empty());
            reassembled.push_str(&data);
        }
        assert_eq!(reassembled, payload);
    }

    #[tokio::test]
    async fn readers_tag_their_own_stream() {
        let (mut out_writer, out_reader) = tokio::io::duplex(64);
        let (mut err_writer, err_reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(16);

        let (out_task, err_task) = spawn_output_readers(out_reader, err_reader, tx);
        out_writer.write_all(b"to stdout").await.unwrap();
        err_writer.write_all(b"to stderr").await.unwrap();
        drop(out_writer);
        drop(err_writer);
        out_task.await.unwrap();
        err_task.await.unwrap();

        let mut stdout_seen = false;
        let mut stderr_seen = false;
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Stdout { data } => {
                    assert_eq!(data, "to stdout");
                    stdout_seen = true;
                }
                Frame::Stderr { data } => {
                    assert_eq!(data, "to stderr");
                    stderr_seen = true;
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert!(stdout_seen && stderr_seen);
    }
}
