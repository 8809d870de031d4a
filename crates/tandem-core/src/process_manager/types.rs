use std::{fmt::Debug, path::PathBuf, pin::Pin};

use futures::{Stream, StreamExt};
use tokio::{io::AsyncRead, sync::watch};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};

pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Splits child output into lines, replacing invalid UTF-8 instead of
/// ending the stream on it.
pub(crate) fn output_lines<R>(reader: R) -> BoxStream<String>
where
    R: AsyncRead + Send + 'static,
{
    let codec = AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new());
    Box::pin(
        FramedRead::new(reader, codec)
            .filter_map(|chunk| async move { chunk.ok() })
            .map(|chunk| {
                String::from_utf8_lossy(&chunk)
                    .trim_end_matches('\r')
                    .to_owned()
            }),
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ProcId(pub u64);

pub struct Spawned {
    pub id: ProcId,
    pub pid: Option<u32>,
    pub stdout: BoxStream<String>,
    pub stderr: BoxStream<String>,
    /// Becomes `Some(code)` once the child has exited.
    pub exit: watch::Receiver<Option<i32>>,
}

impl Debug for Spawned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawned")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("stdout", &"<stream>")
            .field("stderr", &"<stream>")
            .field("exit", &*self.exit.borrow())
            .finish()
    }
}
