use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tracing::debug;

use super::error::StreamError;
use super::signal::{AbortSignal, PauseSignal};

/// 单个连接上的字节流
pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// 支持 HTTP Range 的数据源
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// 通过 `Range: bytes=0-0` 请求获取资源总大小
    async fn fetch_total(&self) -> Result<u64, StreamError>;

    /// 通过 `Range: bytes=<start>-` 打开一个从 `start` 开始的连接
    async fn open_from(&self, start: u64) -> Result<ByteStream, StreamError>;
}

/// 解析 `Content-Range: bytes <start>-<end>/<total>`，返回 total
///
/// 也接受资源为空时的 `bytes */<total>`。
pub fn parse_content_range(value: &str) -> Result<u64, StreamError> {
    let invalid = || StreamError::InvalidContentRange(value.to_string());

    let rest = value.trim().strip_prefix("bytes").ok_or_else(invalid)?.trim_start();
    let (range, total) = rest.split_once('/').ok_or_else(invalid)?;

    let range = range.trim();
    if range != "*" {
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start: u64 = start.trim().parse().map_err(|_| invalid())?;
        let end: u64 = end.trim().parse().map_err(|_| invalid())?;
        if end < start {
            return Err(invalid());
        }
    }

    total.trim().parse().map_err(|_| invalid())
}

/// 可暂停、可恢复的下载流
///
/// 同一时间最多持有一个连接。`bytes_received` 只在数据块交给调用方时增加，
/// 暂停会直接断开连接，恢复时从 `bytes_received` 重新发起 Range 请求，
/// 因此跨越暂停的数据不会丢失也不会重复。连接只在调用方拉取数据时建立，
/// 调用方不拉取时连接也不会被读取，不会在本地无限缓冲。
pub struct ResumableStream<S: RangeSource> {
    source: S,
    bytes_received: u64,
    bytes_total: Option<u64>,
    connection: Option<ByteStream>,
    pause: PauseSignal,
    abort: AbortSignal,
    destroyed: bool,
}

impl<S: RangeSource> ResumableStream<S> {
    pub fn new(source: S, pause: PauseSignal, abort: AbortSignal) -> Self {
        Self {
            source,
            bytes_received: 0,
            bytes_total: None,
            connection: None,
            pause,
            abort,
            destroyed: false,
        }
    }

    /// 从已有的字节位置继续（比如本地残留的 .part 文件）
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.bytes_received = offset;
        self
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// 资源总大小，第一次调用时发起探测请求
    pub async fn total(&mut self) -> Result<u64, StreamError> {
        if let Some(total) = self.bytes_total {
            return Ok(total);
        }
        let total = self.source.fetch_total().await?;
        debug!("资源大小: {} 字节", total);
        self.bytes_total = Some(total);
        Ok(total)
    }

    /// 拉取下一个数据块，数据全部接收后返回 `None`
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        loop {
            if self.destroyed || self.abort.is_aborted() {
                self.destroy();
                return Err(StreamError::Aborted);
            }

            if self.pause.is_paused() {
                self.disconnect();
                let (pause, abort) = (self.pause.clone(), self.abort.clone());
                tokio::select! {
                    _ = abort.aborted() => {}
                    _ = pause.wait_until_resumed() => {}
                }
                continue;
            }

            let total = self.total().await?;
            if self.bytes_received >= total {
                self.disconnect();
                return Ok(None);
            }

            if self.connection.is_none() {
                debug!("发起 Range 请求: bytes={}-", self.bytes_received);
                self.connection = Some(self.source.open_from(self.bytes_received).await?);
            }
            let Some(connection) = self.connection.as_mut() else {
                continue;
            };

            let (pause, abort) = (self.pause.clone(), self.abort.clone());
            let chunk = tokio::select! {
                biased;
                _ = abort.aborted() => continue,
                _ = pause.wait_until_paused() => continue,
                chunk = connection.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    let received = self.bytes_received + bytes.len() as u64;
                    if received > total {
                        self.disconnect();
                        return Err(StreamError::Overflow { received, total });
                    }
                    self.bytes_received = received;
                    return Ok(Some(bytes));
                }
                Some(Err(e)) => {
                    self.disconnect();
                    return Err(e);
                }
                None => {
                    self.disconnect();
                    if self.bytes_received < total {
                        return Err(StreamError::UnexpectedEof {
                            received: self.bytes_received,
                            total,
                        });
                    }
                }
            }
        }
    }

    /// 终止：断开连接，之后不再产生任何数据
    pub fn destroy(&mut self) {
        self.disconnect();
        self.destroyed = true;
    }

    fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            debug!("断开连接，当前位置 {}", self.bytes_received);
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, StreamError>>
    where
        S: 'static,
    {
        stream::unfold(Some(self), |state| async move {
            let mut this = state?;
            match this.next_chunk().await {
                Ok(Some(bytes)) => Some((Ok(bytes), Some(this))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// 内存中的数据源，记录每次连接的起始位置
    #[derive(Clone)]
    pub(crate) struct MemorySource {
        data: Bytes,
        chunk: usize,
        pub opened: Arc<Mutex<Vec<u64>>>,
        pub size_queries: Arc<Mutex<usize>>,
    }

    impl MemorySource {
        pub(crate) fn new(data: Vec<u8>, chunk: usize) -> Self {
            Self {
                data: Bytes::from(data),
                chunk,
                opened: Arc::new(Mutex::new(Vec::new())),
                size_queries: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl RangeSource for MemorySource {
        async fn fetch_total(&self) -> Result<u64, StreamError> {
            *self.size_queries.lock().unwrap() += 1;
            Ok(self.data.len() as u64)
        }

        async fn open_from(&self, start: u64) -> Result<ByteStream, StreamError> {
            self.opened.lock().unwrap().push(start);
            let rest = self.data.slice(start as usize..);
            let chunks: Vec<Result<Bytes, StreamError>> = (0..rest.len())
                .step_by(self.chunk)
                .map(|i| Ok(rest.slice(i..(i + self.chunk).min(rest.len()))))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn parses_content_range() {
        assert_eq!(parse_content_range("bytes 0-0/1000").unwrap(), 1000);
        assert_eq!(parse_content_range("bytes 400-999/1000").unwrap(), 1000);
        assert_eq!(parse_content_range("bytes */0").unwrap(), 0);
        assert!(parse_content_range("bytes 0-0/*").is_err());
        assert!(parse_content_range("items 0-0/10").is_err());
        assert!(parse_content_range("bytes 5-1/10").is_err());
    }

    #[tokio::test]
    async fn reads_whole_resource() {
        let data = payload(1000);
        let source = MemorySource::new(data.clone(), 128);
        let size_queries = source.size_queries.clone();
        let stream = ResumableStream::new(source, PauseSignal::new(), AbortSignal::new());

        let chunks: Vec<Bytes> = stream.into_stream().map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), data);
        assert_eq!(*size_queries.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_restarts_from_cursor() {
        let data = payload(1000);
        let source = MemorySource::new(data.clone(), 100);
        let opened = source.opened.clone();
        let pause = PauseSignal::new();
        let mut stream = ResumableStream::new(source, pause.clone(), AbortSignal::new());

        let mut received = Vec::new();
        for _ in 0..4 {
            received.extend_from_slice(&stream.next_chunk().await.unwrap().unwrap());
        }
        assert_eq!(stream.bytes_received(), 400);

        pause.pause();
        let resumer = pause.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            resumer.resume();
        });

        let mut last = stream.bytes_received();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            assert!(stream.bytes_received() > last);
            assert!(stream.bytes_received() <= 1000);
            last = stream.bytes_received();
            received.extend_from_slice(&chunk);
        }

        assert_eq!(received, data);
        assert_eq!(*opened.lock().unwrap(), vec![0, 400]);
        assert!(!stream.is_connected());
    }

    #[tokio::test]
    async fn finished_resource_makes_no_request() {
        let source = MemorySource::new(payload(10), 4);
        let opened = source.opened.clone();
        let mut stream =
            ResumableStream::new(source, PauseSignal::new(), AbortSignal::new()).starting_at(10);

        assert!(stream.next_chunk().await.unwrap().is_none());
        assert!(opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_resource_ends_immediately() {
        let source = MemorySource::new(Vec::new(), 4);
        let opened = source.opened.clone();
        let mut stream = ResumableStream::new(source, PauseSignal::new(), AbortSignal::new());

        assert!(stream.next_chunk().await.unwrap().is_none());
        assert_eq!(stream.bytes_total(), Some(0));
        assert!(opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_destroys_stream() {
        let source = MemorySource::new(payload(100), 10);
        let abort = AbortSignal::new();
        let mut stream = ResumableStream::new(source, PauseSignal::new(), abort.clone());

        assert!(stream.next_chunk().await.unwrap().is_some());
        abort.abort();
        assert!(matches!(stream.next_chunk().await, Err(StreamError::Aborted)));
        assert!(!stream.is_connected());
        assert_eq!(stream.bytes_received(), 10);
    }

    #[tokio::test]
    async fn truncated_connection_is_an_error() {
        struct ShortSource;

        #[async_trait]
        impl RangeSource for ShortSource {
            async fn fetch_total(&self) -> Result<u64, StreamError> {
                Ok(10)
            }

            async fn open_from(&self, _start: u64) -> Result<ByteStream, StreamError> {
                Ok(stream::iter(vec![Ok(Bytes::from_static(b"abc"))]).boxed())
            }
        }

        let mut stream = ResumableStream::new(ShortSource, PauseSignal::new(), AbortSignal::new());
        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 3);
        assert!(matches!(
            stream.next_chunk().await,
            Err(StreamError::UnexpectedEof {
                received: 3,
                total: 10
            })
        ));
    }
}
