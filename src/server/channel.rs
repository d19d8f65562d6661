//! SSH channel seen as a [`ShellSession`].

use russh::server::Msg;
use russh::{Channel, ChannelStream};
use tokio::io::{ReadHalf, WriteHalf};

use crate::session::{SessionRequest, ShellSession};

/// An accepted session channel plus what the peer asked to run on it.
pub struct ChannelSession {
    request: SessionRequest,
    stream: ChannelStream<Msg>,
}

impl ChannelSession {
    pub fn new(request: SessionRequest, channel: Channel<Msg>) -> Self {
        Self {
            request,
            stream: channel.into_stream(),
        }
    }
}

impl ShellSession for ChannelSession {
    type Reader = ReadHalf<ChannelStream<Msg>>;
    type Writer = WriteHalf<ChannelStream<Msg>>;

    fn request(&self) -> &SessionRequest {
        &self.request
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        tokio::io::split(self.stream)
    }
}
