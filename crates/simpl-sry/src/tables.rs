use std::path::PathBuf;

use crate::error::{Result, SryError};
use simpl_transport::SegmentHandle;

/// A fixed-capacity list that refuses to grow past its bound.
#[derive(Debug)]
pub struct BoundedTable<T> {
    label: &'static str,
    entries: Vec<T>,
    capacity: usize,
}

impl<T> BoundedTable<T> {
    pub fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, entry: T) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(SryError::TableFull {
                table: self.label,
                capacity: self.capacity,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Remove the first entry matching `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let index = self.entries.iter().position(pred)?;
        Some(self.entries.swap_remove(index))
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.entries.drain(..)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }
}

/// A sender blocked on a reply from this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSender {
    pub name: String,
    pub pid: u32,
    pub segment: SegmentHandle,
    pub reply_path: PathBuf,
}

/// A surrogate session this process reaches a remote receiver through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReceiver {
    pub name: String,
    pub pid: u32,
    pub receive_path: PathBuf,
}
