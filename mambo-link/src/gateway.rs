use crate::error::LinkError;
use crate::frame::Channel;
use async_trait::async_trait;

/// Bytes delivered by the transport on one of the inbound channels
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

impl Inbound {
    pub fn new(channel: Channel, bytes: Vec<u8>) -> Self {
        Inbound { channel, bytes }
    }
}

/// Describes the radio transport the engine drives.
///
/// Implementations come already connected to an aircraft, with every channel
/// mapped to its characteristic. Discovery, pairing and service enumeration
/// happen before a gateway is handed to [crate::Minidrone::connect].
#[async_trait]
pub trait LinkGateway {
    /// Write one frame on an outbound channel
    ///
    /// An error means the frame did not leave this host, the engine fails the
    /// command immediately instead of retrying it.
    async fn write(&self, channel: Channel, bytes: Vec<u8>) -> Result<(), LinkError>;

    /// Deliver every notification received on `channel` to `sink`
    ///
    /// The sink is a bounded queue. When the transport drops all the sinks it was
    /// given, the engine considers the link lost.
    async fn subscribe(&self, channel: Channel, sink: flume::Sender<Inbound>) -> Result<(), LinkError>;

    /// Close the radio connection
    async fn disconnect(&self);
}
