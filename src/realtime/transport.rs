//! WebSocket 传输层
//!
//! 连接被抽象为一对文本通道：
//! - `outgoing`: 写入即发送；丢弃发送端会关闭连接
//! - `incoming`: 收到的文本帧；返回 `None` 表示连接已关闭
//!
//! 生产实现 `TungsteniteConnector` 为每条连接启动一个收发任务。

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("WebSocket 连接失败: {0}")]
    Connect(String),
}

/// 已建立的连接
pub struct Connection {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// 建立连接
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, TransportError>>;
}

/// tokio-tungstenite 连接器
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, TransportError>> {
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            tracing::debug!(host = url.host_str().unwrap_or_default(), "WebSocket 已连接");

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
            let (mut sink, mut source) = stream.split();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        outgoing = out_rx.recv() => match outgoing {
                            Some(text) => {
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    tracing::warn!(error = %e, "WebSocket 发送失败");
                                    break;
                                }
                            }
                            None => {
                                let _ = sink.close().await;
                                break;
                            }
                        },
                        frame = source.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::debug!(?frame, "服务器关闭了 WebSocket");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "WebSocket 读取失败");
                                break;
                            }
                            None => break,
                        },
                    }
                }
            });

            Ok(Connection {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}
