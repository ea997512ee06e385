//! Common traits

use core::time::Duration;
use std::{error, path::Path};

use crate::{dictionary::ObjectDictionary, messages::CanMessage};

/// Error type for CAN send operations containing the failed message
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct CanSendError(pub CanMessage);

impl core::fmt::Display for CanSendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to send CAN message: {:?}", self.0)
    }
}

impl error::Error for CanSendError {}

/// A synchronous can sender
pub trait CanSender {
    /// Send a message to the bus
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError>;
}

/// A synchronous can receiver
pub trait CanReceiver {
    /// The error type returned by recv
    type Error: core::fmt::Debug;
    /// Attempt to read a message from the receiver, and return None immediately if no message is
    /// available
    fn try_recv(&mut self) -> Option<CanMessage>;
    /// A blocking receive with timeout
    fn recv(&mut self, timeout: Duration) -> Result<CanMessage, Self::Error>;

    /// Remove any pending messages from the receiver
    fn flush(&mut self) {
        while self.try_recv().is_some() {}
    }
}

impl<T: CanSender + ?Sized> CanSender for &mut T {
    fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        (**self).send(msg)
    }
}

impl<T: CanReceiver + ?Sized> CanReceiver for &mut T {
    type Error = T::Error;

    fn try_recv(&mut self) -> Option<CanMessage> {
        (**self).try_recv()
    }

    fn recv(&mut self, timeout: Duration) -> Result<CanMessage, Self::Error> {
        (**self).recv(timeout)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Loads and stores object dictionaries from/to description files (EDS/DCF)
pub trait ObjectDictionarySource {
    /// Error returned by load and export
    type Error: error::Error + Send + Sync + 'static;

    /// Read a dictionary description from `path`
    fn load(&self, path: &Path) -> Result<ObjectDictionary, Self::Error>;

    /// Write the dictionary, including any values read from the device, to `path`
    fn export(&self, dictionary: &ObjectDictionary, path: &Path) -> Result<(), Self::Error>;
}
