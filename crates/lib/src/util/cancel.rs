use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative cancellation shared between a run and its tasks.
///
/// Clones observe the same state. Once cancelled a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
  tx: Arc<watch::Sender<bool>>,
  rx: watch::Receiver<bool>,
}

impl CancelToken {
  pub fn new() -> Self {
    let (tx, rx) = watch::channel(false);
    Self { tx: Arc::new(tx), rx }
  }

  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once the token is cancelled.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    // The sender lives as long as any clone of the token, so this only
    // returns once the value flips.
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn clones_share_state() {
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    token.cancel();
    assert!(clone.is_cancelled());
    tokio::time::timeout(Duration::from_secs(1), clone.cancelled())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn cancelled_waits_until_cancel() {
    let token = CancelToken::new();
    let waiter = tokio::spawn({
      let token = token.clone();
      async move { token.cancelled().await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
  }
}
