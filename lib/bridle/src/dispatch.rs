//! Typed command dispatch. Each subserver owns a registry mapping command
//! ids to type-erased raw handlers; registration captures the payload type
//! so the raw handler reads a value off the source stream and calls the
//! typed handler with it. Outbound traffic goes through the `CommandConduit`
//! trait, which the mio host implements and director tests fake.

use crate::shared::{ClientId, ErrorType, ProtocolError, ProtocolResult};
use crate::stream::{Command, SinkStream, SourceStream, WireRead, WireWrite};
use hashbrown::HashMap;
use stirrup::logging;

/// Outbound side of a subserver, as seen by its director.
pub trait CommandConduit {
    /// Serializes one command into a framed, scrambled outbound message for
    /// the client.
    fn queue_frame(
        &mut self,
        client_id: ClientId,
        command_id: u16,
        writer: &mut dyn FnMut(&mut SinkStream<'_>) -> ProtocolResult<()>,
    );

    /// Resets the client's rolling scramble code to zero.
    fn reset_code(&mut self, client_id: ClientId);

    /// Drops the connection immediately.
    fn disconnect(&mut self, client_id: ClientId);

    /// Drops the connection once queued replies have flushed.
    fn disconnect_after_flush(&mut self, client_id: ClientId);
}

/// Typed queueing sugar over `CommandConduit`. The supplier runs once, when
/// the frame is assembled.
pub trait CommandConduitExt: CommandConduit {
    #[inline]
    fn queue_command<T, F>(&mut self, client_id: ClientId, supplier: F)
    where
        T: Command + WireWrite,
        F: FnOnce() -> T,
    {
        let command = supplier();
        self.queue_frame(client_id, T::ID, &mut |sink| command.write(sink));
    }
}

impl<C: CommandConduit + ?Sized> CommandConduitExt for C {}

type RawHandler<D> = Box<
    dyn Fn(&mut D, &mut dyn CommandConduit, ClientId, &mut SourceStream<'_>) -> ProtocolResult<()>
        + Send,
>;

/// Registry from command id to raw handler for one subserver. At most one
/// handler per id; re-registration replaces atomically.
pub struct CommandRegistry<D> {
    handlers: HashMap<u16, RawHandler<D>>,
    log: logging::Logger,
}

impl<D: 'static> CommandRegistry<D> {
    pub fn new(log: &logging::Logger) -> CommandRegistry<D> {
        CommandRegistry {
            handlers: HashMap::new(),
            log: log.new(logging::o!()),
        }
    }

    /// Registers the typed handler for `T`. The raw handler reads a `T` off
    /// the descrambled payload and forwards it; a read failure is reported
    /// as a malformed command, which is fatal for the connection.
    pub fn register<T, F>(&mut self, handler: F)
    where
        T: Command + WireRead + 'static,
        F: Fn(&mut D, &mut dyn CommandConduit, ClientId, T) + Send + 'static,
    {
        self.handlers.insert(
            T::ID,
            Box::new(move |director, conduit, client_id, stream| {
                let command = T::read(stream)
                    .map_err(|_| ProtocolError::Fatal(ErrorType::MalformedCommand))?;
                handler(director, conduit, client_id, command);
                Ok(())
            }),
        );
    }

    /// Dispatches one inbound frame. Unknown ids are warned about and
    /// consumed; the connection stays up. Handler read errors propagate and
    /// kill the connection.
    pub fn dispatch(
        &self,
        director: &mut D,
        conduit: &mut dyn CommandConduit,
        client_id: ClientId,
        command_id: u16,
        payload: &[u8],
    ) -> ProtocolResult<()> {
        let handler = match self.handlers.get(&command_id) {
            Some(handler) => handler,
            None => {
                logging::warn!(self.log, "unhandled command";
                               "client_id" => client_id,
                               "command_id" => format!("{:#06x}", command_id),
                               "length" => payload.len());
                return Ok(());
            }
        };

        let mut stream = SourceStream::new(payload);
        handler(director, conduit, client_id, &mut stream)
    }

    /// Returns true if a handler is registered for the id.
    pub fn is_registered(&self, command_id: u16) -> bool {
        self.handlers.contains_key(&command_id)
    }
}
