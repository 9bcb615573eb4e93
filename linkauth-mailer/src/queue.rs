//! In-process delivery queue.
//!
//! Producers [`push`](DeliveryQueue::push) composed messages without awaiting and a
//! single background worker hands them to a [`Mailer`]. The worker removes a message
//! from the queue before the first send attempt, so delivery is at-most-once: a
//! message that exhausts its retries, or is in flight when the worker shuts down, is
//! gone. Callers that need to undo work when a message cannot be queued must act on
//! the error returned by `push`, which is the only failure they can observe.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::disposable::DomainList;
use crate::{Email, Mailer, MailerError, address_domain, is_valid_address};

pub struct DeliveryQueue {
    items: Mutex<VecDeque<Email>>,
    notify: Notify,
    disallowed: DomainList,
    send_retries: u32,
}

impl DeliveryQueue {
    pub fn new(disallowed: DomainList, config: &QueueConfig) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            disallowed,
            send_retries: config.send_retries.max(1),
        }
    }

    /// Returns true if `address` is well formed and its domain is not disallowed.
    /// An empty domain list allows every domain.
    pub fn allowed(&self, address: &str) -> bool {
        if !is_valid_address(address) {
            return false;
        }
        if self.disallowed.is_empty() {
            return true;
        }
        match address_domain(address) {
            Some(domain) => !self.disallowed.contains(&domain),
            None => false,
        }
    }

    /// Appends a message and wakes the worker. Nothing is enqueued on error.
    pub fn push(&self, email: Email) -> Result<(), MailerError> {
        email.validate()?;

        if !self.allowed(&email.to) {
            let domain = address_domain(&email.to).unwrap_or_default();
            return Err(MailerError::DisallowedDomain(domain));
        }

        self.lock().push_back(email);
        self.notify.notify_one();
        Ok(())
    }

    /// Removes and returns the head of the queue.
    pub fn pop(&self) -> Option<Email> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sends one message, retrying immediately up to the configured number of
    /// attempts. The message is never put back on the queue.
    pub async fn deliver(&self, mailer: &dyn Mailer, email: Email) -> Result<(), MailerError> {
        let mut attempt = 1;
        loop {
            match mailer.send_email(email.clone()).await {
                Ok(()) => {
                    tracing::debug!(to = %email.to, attempt, "Email delivered");
                    return Ok(());
                }
                Err(e) if attempt >= self.send_retries => {
                    tracing::error!(
                        error = %e,
                        to = %email.to,
                        attempts = attempt,
                        "Giving up on email delivery"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, to = %email.to, attempt, "Email delivery failed, retrying");
                    attempt += 1;
                }
            }
        }
    }

    /// Delivers everything currently queued on the calling task and returns how many
    /// messages were sent. Used by short lived processes that do not run a worker.
    pub async fn deliver_pending(&self, mailer: &dyn Mailer) -> usize {
        let mut delivered = 0;
        while let Some(email) = self.pop() {
            if self.deliver(mailer, email).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Spawns the single consumer. The task exits as soon as `shutdown` changes,
    /// abandoning an in-flight send and leaving queued messages undelivered.
    pub fn start_worker(
        self: &Arc<Self>,
        mailer: Arc<dyn Mailer>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let queue = Arc::clone(self);

        tokio::spawn(async move {
            tracing::info!("Starting email delivery worker");
            loop {
                let email = tokio::select! {
                    _ = shutdown.changed() => break,
                    email = queue.next() => email,
                };

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = queue.deliver(mailer.as_ref(), email) => {}
                }
            }
            tracing::info!(dropped = queue.len(), "Shutting down email delivery worker");
        })
    }

    async fn next(&self) -> Email {
        loop {
            if let Some(email) = self.pop() {
                return email;
            }
            self.notify.notified().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Email>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails the first `fail_first` attempts, then records every message it sends.
    struct RecordingMailer {
        fail_first: usize,
        attempts: AtomicUsize,
        sent: Mutex<Vec<Email>>,
    }

    impl RecordingMailer {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_first,
                attempts: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_email(&self, email: Email) -> Result<(), MailerError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(MailerError::Config("smtp unavailable".to_string()));
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    /// Never completes a send.
    struct StuckMailer;

    #[async_trait]
    impl Mailer for StuckMailer {
        async fn send_email(&self, _email: Email) -> Result<(), MailerError> {
            std::future::pending().await
        }
    }

    fn email(to: &str) -> Email {
        Email::new("noreply@linkauth.dev", to, "Here is your magic link for 'Test' 🔐")
            .with_text("https://x.com/cb?token=a-b-c")
    }

    fn queue(disallowed: &[&str]) -> Arc<DeliveryQueue> {
        Arc::new(DeliveryQueue::new(
            disallowed.iter().copied().collect(),
            &QueueConfig::default(),
        ))
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_push_is_fifo() {
        let queue = queue(&[]);
        queue.push(email("first@example.com")).unwrap();
        queue.push(email("second@example.com")).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().to, "first@example.com");
        assert_eq!(queue.pop().unwrap().to, "second@example.com");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_push_disallowed_domain() {
        let queue = queue(&["mailinator.com"]);
        queue.push(email("kept@example.com")).unwrap();

        let result = queue.push(email("user@Mailinator.com"));
        assert!(matches!(result, Err(MailerError::DisallowedDomain(d)) if d == "mailinator.com"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_push_invalid_message() {
        let queue = queue(&[]);

        let mut bad_recipient = email("user@example.com");
        bad_recipient.to = "user-at-example".to_string();
        assert!(matches!(
            queue.push(bad_recipient),
            Err(MailerError::InvalidRecipient(_))
        ));

        let mut no_subject = email("user@example.com");
        no_subject.subject = String::new();
        assert!(matches!(queue.push(no_subject), Err(MailerError::Builder(_))));

        assert!(queue.is_empty());
    }

    #[test]
    fn test_allowed() {
        let open = queue(&[]);
        assert!(open.allowed("user@anything.io"));
        assert!(!open.allowed("not an address"));

        let restricted = queue(&["yopmail.com"]);
        assert!(restricted.allowed("user@example.com"));
        assert!(!restricted.allowed("user@yopmail.com"));
    }

    #[tokio::test]
    async fn test_worker_retries_then_delivers() {
        let queue = queue(&[]);
        let mailer = RecordingMailer::new(2);
        let (tx, rx) = watch::channel(false);
        let handle = queue.start_worker(mailer.clone(), rx);

        queue.push(email("user@example.com")).unwrap();
        wait_until(|| mailer.sent().len() == 1).await;

        assert_eq!(mailer.attempts(), 3);
        assert!(queue.is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_drops_after_retries() {
        let queue = queue(&[]);
        let mailer = RecordingMailer::new(usize::MAX);
        let (tx, rx) = watch::channel(false);
        let handle = queue.start_worker(mailer.clone(), rx);

        queue.push(email("user@example.com")).unwrap();
        wait_until(|| mailer.attempts() == 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Dropped, not re-enqueued and not retried again
        assert_eq!(mailer.attempts(), 3);
        assert!(queue.is_empty());

        // The worker keeps serving later messages
        queue.push(email("other@example.com")).unwrap();
        wait_until(|| mailer.attempts() == 6).await;

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_during_send() {
        let queue = queue(&[]);
        let (tx, rx) = watch::channel(false);
        let handle = queue.start_worker(Arc::new(StuckMailer), rx);

        queue.push(email("first@example.com")).unwrap();
        wait_until(|| queue.is_empty()).await;
        queue.push(email("second@example.com")).unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();

        // Queued mail is not drained on shutdown
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_worker_stops_when_idle() {
        let queue = queue(&[]);
        let (tx, rx) = watch::channel(false);
        let handle = queue.start_worker(RecordingMailer::new(0), rx);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_deliver_pending() {
        let queue = queue(&[]);
        let mailer = RecordingMailer::new(3);
        queue.push(email("first@example.com")).unwrap();
        queue.push(email("second@example.com")).unwrap();

        // The first message uses up all three attempts and is dropped
        let delivered = queue.deliver_pending(mailer.as_ref()).await;

        assert_eq!(delivered, 1);
        assert!(queue.is_empty());
        assert_eq!(mailer.sent()[0].to, "second@example.com");
    }
}
