use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::error::StreamError;
use super::signal::{AbortSignal, PauseSignal};

/// 对远程资源 `[offset, offset + len - 1]` 的一次部分写入
///
/// 不保存任何暂停状态，调用方自己维护偏移量。
#[async_trait]
pub trait RangeSink: Send + Sync {
    async fn write_range(&self, offset: u64, chunk: Bytes) -> Result<(), StreamError>;
}

/// `bytes=<start>-<end>` 形式的范围描述
pub fn update_range(offset: u64, len: u64) -> String {
    format!("bytes={}-{}", offset, offset + len.saturating_sub(1))
}

/// 按块把 `reader` 的内容写到 `sink`，从 `offset` 开始
///
/// 暂停期间不发起写入，恢复后从最后一次确认的偏移量继续；偏移量只在写入成功后前进。
/// 返回最终偏移量。
pub async fn upload_ranges<S, R>(
    sink: &S,
    reader: &mut R,
    mut offset: u64,
    chunk_size: usize,
    pause: &PauseSignal,
    abort: &AbortSignal,
    mut on_progress: impl FnMut(u64) + Send,
) -> Result<u64, StreamError>
where
    S: RangeSink + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        if abort.is_aborted() {
            return Err(StreamError::Aborted);
        }
        if pause.is_paused() {
            debug!("上传已暂停，当前位置 {}", offset);
            tokio::select! {
                _ = abort.aborted() => return Err(StreamError::Aborted),
                _ = pause.wait_until_resumed() => {}
            }
            continue;
        }

        let n = read_full(reader, &mut buf).await?;
        if n == 0 {
            return Ok(offset);
        }

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        tokio::select! {
            biased;
            _ = abort.aborted() => return Err(StreamError::Aborted),
            result = sink.write_range(offset, chunk) => result?,
        }
        offset += n as u64;
        on_progress(offset);
    }
}

// 尽量读满一个块，文件末尾才会返回不足一块
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default, Clone)]
    struct MemorySink {
        writes: Arc<Mutex<Vec<(u64, Vec<u8>)>>>,
    }

    #[async_trait]
    impl RangeSink for MemorySink {
        async fn write_range(&self, offset: u64, chunk: Bytes) -> Result<(), StreamError> {
            self.writes.lock().unwrap().push((offset, chunk.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn update_range_is_inclusive() {
        assert_eq!(update_range(0, 100), "bytes=0-99");
        assert_eq!(update_range(400, 1), "bytes=400-400");
    }

    #[tokio::test]
    async fn writes_contiguous_chunks_across_pause() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let sink = MemorySink::default();
        let pause = PauseSignal::new();
        let abort = AbortSignal::new();

        let trigger = pause.clone();
        let mut reader = data.as_slice();
        let end = upload_ranges(&sink, &mut reader, 0, 300, &pause, &abort, move |offset| {
            if offset == 600 {
                trigger.pause();
                let resumer = trigger.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    resumer.resume();
                });
            }
        })
        .await
        .unwrap();

        assert_eq!(end, 1000);
        let writes = sink.writes.lock().unwrap();
        let offsets: Vec<u64> = writes.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 300, 600, 900]);
        let joined: Vec<u8> = writes.iter().flat_map(|(_, c)| c.clone()).collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn abort_stops_before_next_write() {
        let sink = MemorySink::default();
        let abort = AbortSignal::new();
        abort.abort();
        let mut reader: &[u8] = b"hello";

        let result =
            upload_ranges(&sink, &mut reader, 0, 2, &PauseSignal::new(), &abort, |_| {}).await;
        assert!(matches!(result, Err(StreamError::Aborted)));
        assert!(sink.writes.lock().unwrap().is_empty());
    }
}
