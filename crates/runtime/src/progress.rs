// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-session progress stream.

use crate::SessionId;
use tokio::sync::mpsc;

/// One progress update.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProgressEvent {
    pub session: SessionId,
    /// Completed fraction of the current plan, `0.0..=100.0`, never decreasing.
    pub percent: f64,
    pub message: String,
    /// Index of the stage this event refers to.
    pub stage_index: usize,
    pub total_stages: usize,
}

/// Receiving end handed to the caller.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Publishing end owned by the orchestrator.
///
/// Percentages are clamped so the stream never goes backwards, even when a
/// replan grows the total number of stages.
#[derive(Debug)]
pub struct ProgressPublisher {
    session: SessionId,
    tx: mpsc::UnboundedSender<ProgressEvent>,
    last_percent: f64,
}

impl ProgressPublisher {
    pub fn channel(session: SessionId) -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session,
                tx,
                last_percent: 0.0,
            },
            rx,
        )
    }

    /// Publishes `completed / total` and returns the published percentage.
    pub fn stage(&mut self, completed: usize, total: usize, message: impl Into<String>) -> f64 {
        let raw = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        self.publish(raw, completed, total, message.into())
    }

    /// Publishes the final 100 %.
    pub fn complete(&mut self, total: usize, message: impl Into<String>) -> f64 {
        self.publish(100.0, total, total, message.into())
    }

    /// Re-publishes the last percentage with a new message.
    pub fn note(&mut self, stage_index: usize, total: usize, message: impl Into<String>) -> f64 {
        self.publish(self.last_percent, stage_index, total, message.into())
    }

    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }

    fn publish(&mut self, raw: f64, stage_index: usize, total_stages: usize, message: String) -> f64 {
        let percent = raw.clamp(0.0, 100.0).max(self.last_percent);
        self.last_percent = percent;
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(ProgressEvent {
            session: self.session,
            percent,
            message,
            stage_index,
            total_stages,
        });
        percent
    }
}
