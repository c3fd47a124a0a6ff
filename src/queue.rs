//! The ordered queue of pending requests.
//!
//! Entries move `Staged → Written → settled`.  Staged entries are flushed
//! in coalesced batches; written entries wait for one reply per command.
//! A cancelled written entry stays queued as `CancelledDraining` so its
//! replies can be consumed silently -- dropping them early would desync
//! every reply that follows.

use std::collections::VecDeque;

use resp3::{Node, RequestConfig};
use tokio::sync::oneshot;

use crate::error::Error;

/// What a completed request hands back to its submitter.
#[derive(Debug)]
pub(crate) struct ExecOutcome {
    /// One pre-order node view per command, in push order.
    pub replies: Vec<Vec<Node>>,
    /// Total reply bytes consumed for this request.
    pub bytes_read: usize,
}

pub(crate) type CompletionTx = oneshot::Sender<Result<ExecOutcome, Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Staged,
    Written,
    CancelledDraining,
}

#[derive(Debug)]
struct Entry {
    bytes: Vec<u8>,
    n_commands: usize,
    config: RequestConfig,
    state: EntryState,
    replies: Vec<Vec<Node>>,
    bytes_read: usize,
    done: Option<CompletionTx>,
}

impl Entry {
    fn new(bytes: Vec<u8>, n_commands: usize, config: RequestConfig, done: CompletionTx) -> Entry {
        Entry {
            bytes,
            n_commands,
            config,
            state: EntryState::Staged,
            replies: Vec::new(),
            bytes_read: 0,
            done: Some(done),
        }
    }

    fn signal(&mut self, result: Result<ExecOutcome, Error>) {
        if let Some(tx) = self.done.take() {
            let _ = tx.send(result);
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    entries: VecDeque<Entry>,
}

impl RequestQueue {
    pub(crate) fn new() -> RequestQueue {
        RequestQueue::default()
    }

    /// Appends a request in `Staged` state.
    pub(crate) fn stage(
        &mut self,
        bytes: Vec<u8>,
        n_commands: usize,
        config: RequestConfig,
        done: CompletionTx,
    ) {
        self.entries
            .push_back(Entry::new(bytes, n_commands, config, done));
    }

    /// Prepends a request, ahead of everything staged so far.  Used for the
    /// connection handshake.
    pub(crate) fn stage_front(
        &mut self,
        bytes: Vec<u8>,
        n_commands: usize,
        config: RequestConfig,
        done: CompletionTx,
    ) {
        self.entries
            .push_front(Entry::new(bytes, n_commands, config, done));
    }

    /// True when the next flush would carry bytes.
    pub(crate) fn writable(&self) -> bool {
        self.entries
            .front()
            .is_some_and(|e| e.state == EntryState::Staged)
    }

    /// Takes the next write batch: the leading run of `Staged` entries,
    /// joined only across mutual `coalesce` consent and up to a soft byte
    /// cap.  Returns `None` while the previous batch is still awaiting
    /// replies (head-of-line rule) or nothing is staged.
    pub(crate) fn front_to_write(&mut self, max_batch: usize) -> Option<Vec<u8>> {
        if !self.writable() {
            return None;
        }
        let mut batch = Vec::new();
        let mut prev_coalesce = true;
        for entry in &mut self.entries {
            if entry.state != EntryState::Staged {
                break;
            }
            if !batch.is_empty() && !(prev_coalesce && entry.config.coalesce) {
                break;
            }
            if !batch.is_empty() && batch.len() >= max_batch {
                break;
            }
            batch.extend_from_slice(&entry.bytes);
            entry.state = EntryState::Written;
            prev_coalesce = entry.config.coalesce;
        }
        Some(batch)
    }

    /// True when the head entry has been written and is owed replies.
    pub(crate) fn has_head_awaiting(&self) -> bool {
        self.entries
            .front()
            .is_some_and(|e| e.state != EntryState::Staged)
    }

    /// Delivers one command's reply to the head entry.  When the entry's
    /// last command settles it is popped and its submitter signalled.
    pub(crate) fn advance_command(&mut self, nodes: Vec<Node>, bytes_read: usize) {
        let Some(head) = self
            .entries
            .front_mut()
            .filter(|e| e.state != EntryState::Staged)
        else {
            // Stray replies are rejected by the reader before parsing; a
            // reply landing here mid-teardown is dropped.
            return;
        };
        head.replies.push(nodes);
        head.bytes_read += bytes_read;
        if head.replies.len() >= head.n_commands {
            if let Some(mut entry) = self.entries.pop_front() {
                let outcome = ExecOutcome {
                    replies: std::mem::take(&mut entry.replies),
                    bytes_read: entry.bytes_read,
                };
                // CancelledDraining entries were signalled at cancel time.
                if entry.state == EntryState::Written {
                    entry.signal(Ok(outcome));
                }
            }
        }
    }

    /// Cancels the `exec` scope: staged entries leave immediately, written
    /// entries are signalled now but drained silently.
    pub(crate) fn cancel_exec(&mut self) {
        self.entries.retain_mut(|entry| match entry.state {
            EntryState::Staged => {
                entry.signal(Err(Error::OperationCancelled));
                false
            }
            EntryState::Written => {
                entry.signal(Err(Error::OperationCancelled));
                entry.state = EntryState::CancelledDraining;
                true
            }
            EntryState::CancelledDraining => true,
        });
    }

    /// Connection-loss drain.  `written_fatal` marks losses after which a
    /// written entry's reply can never be trusted (protocol desync): such
    /// entries always fail.  Survivors return to `Staged` for replay.
    pub(crate) fn drain_on_disconnect(&mut self, error: &Error, written_fatal: bool) {
        self.entries.retain_mut(|entry| match entry.state {
            EntryState::CancelledDraining => false,
            state => {
                let fail = entry.config.cancel_if_unresponsive
                    || (written_fatal && state == EntryState::Written);
                if fail {
                    entry.signal(Err(error.clone()));
                    false
                } else {
                    entry.state = EntryState::Staged;
                    entry.replies.clear();
                    entry.bytes_read = 0;
                    true
                }
            }
        });
    }

    /// Fails every entry and empties the queue.
    pub(crate) fn fail_all(&mut self, error: &Error) {
        for entry in &mut self.entries {
            entry.signal(Err(error.clone()));
        }
        self.entries.clear();
    }

    #[cfg(test)]
    fn states(&self) -> Vec<EntryState> {
        self.entries.iter().map(|e| e.state).collect()
    }
}
