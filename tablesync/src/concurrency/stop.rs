use tokio::sync::watch;

/// Sending half of the run stop signal.
///
/// The orchestrator's `stop` call signals through this handle; the driver
/// loop and the in-flight process wait both hold receivers. The channel
/// carries no payload, observing a change is the whole message.
#[derive(Debug, Clone)]
pub struct StopTx(watch::Sender<()>);

impl StopTx {
    /// Signals every subscribed receiver that the run should stop.
    pub fn stop(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Returns a new receiver observing future stop signals.
    pub fn subscribe(&self) -> StopRx {
        self.0.subscribe()
    }
}

/// Receiving half of the run stop signal.
pub type StopRx = watch::Receiver<()>;

/// Creates a new pair of [`StopTx`] and [`StopRx`].
pub fn create_stop_channel() -> (StopTx, StopRx) {
    let (tx, rx) = watch::channel(());
    (StopTx(tx), rx)
}
