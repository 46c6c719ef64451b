//! The maturity schedule: an arena of deposit buckets ordered by end date.
//!
//! Buckets live in a `Vec` indexed by `id - 1` and are linked through their
//! `prev`/`next` ids. The schedule keeps two cursors:
//!
//! - `head` is the first bucket the index engine has not yet retired. The
//!   engine moves it forward with [`Schedule::advance_head`]; buckets behind
//!   it stay linked as history.
//! - `tail` is the last bucket ever linked in.
//!
//! The live range `head..=tail` is sorted by strictly increasing end date:
//! inserting an end date that already exists in the live range merges into
//! that bucket. Nodes are never unlinked, only zeroed.
//!
//! Insertion walks backwards from the tail, so the common case of a new
//! deposit maturing after every existing one is O(1).

use std::collections::BTreeSet;

use crate::error::ScheduleError;
use crate::types::{is_null, Amount, BucketId, MaturityBucket, Timestamp};

/// Result of [`Schedule::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Insertion {
    /// Bucket that now holds the amount.
    pub id: BucketId,
    /// `true` if an existing bucket with the same end date absorbed it.
    pub merged: bool,
}

/// Result of [`Schedule::reduce`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reduction {
    /// Bucket that was reduced.
    pub id: BucketId,
    /// Amount actually removed (clamped to what the bucket held).
    pub removed: Amount,
    /// `true` if the bucket is in the live range, i.e. still counted in the
    /// ledger's active value.
    pub live: bool,
}

/// Sorted, id-addressed collection of maturity buckets.
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    /// Bucket `id` is stored at `buckets[id - 1]`.
    buckets: Vec<MaturityBucket>,
    head: BucketId,
    tail: BucketId,
    /// Buckets modified since the last [`take_dirty`](Self::take_dirty).
    dirty: BTreeSet<BucketId>,
}

impl Schedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a schedule from persisted buckets and cursors.
    ///
    /// `buckets` must hold ids `1..=n` exactly once, in any order.
    pub fn from_parts(
        mut buckets: Vec<(BucketId, MaturityBucket)>,
        head: BucketId,
        tail: BucketId,
    ) -> Result<Self, ScheduleError> {
        buckets.sort_by_key(|(id, _)| *id);
        for (position, (id, _)) in buckets.iter().enumerate() {
            if *id != position as BucketId + 1 {
                return Err(ScheduleError::Corrupt(format!(
                    "expected bucket id {}, found {id}",
                    position + 1
                )));
            }
        }
        let len = buckets.len() as BucketId;
        if head > len || tail > len || (is_null(tail) && len > 0) {
            return Err(ScheduleError::Corrupt(format!(
                "cursors head={head} tail={tail} out of range for {len} buckets"
            )));
        }

        Ok(Self {
            buckets: buckets.into_iter().map(|(_, bucket)| bucket).collect(),
            head,
            tail,
            dirty: BTreeSet::new(),
        })
    }

    /// First bucket not yet retired, or [`NULL_BUCKET`](crate::constants::NULL_BUCKET).
    pub fn head(&self) -> BucketId {
        self.head
    }

    /// Last linked bucket, or [`NULL_BUCKET`](crate::constants::NULL_BUCKET) if nothing was ever inserted.
    pub fn tail(&self) -> BucketId {
        self.tail
    }

    /// Number of buckets ever created, retired ones included.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket was ever created.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether any bucket is still waiting to be retired.
    pub fn has_live(&self) -> bool {
        !is_null(self.head)
    }

    /// Look up a bucket by id.
    pub fn bucket(&self, id: BucketId) -> Option<&MaturityBucket> {
        if is_null(id) {
            return None;
        }
        self.buckets.get(id as usize - 1)
    }

    /// Look up a bucket by id, failing for unknown ids.
    pub fn get(&self, id: BucketId) -> Result<&MaturityBucket, ScheduleError> {
        self.bucket(id).ok_or(ScheduleError::UnknownBucket(id))
    }

    fn bucket_mut(&mut self, id: BucketId) -> Result<&mut MaturityBucket, ScheduleError> {
        if is_null(id) || id as usize > self.buckets.len() {
            return Err(ScheduleError::UnknownBucket(id));
        }
        self.dirty.insert(id);
        Ok(&mut self.buckets[id as usize - 1])
    }

    /// End date of the head bucket, if any bucket is live.
    pub fn first_maturity(&self) -> Option<Timestamp> {
        self.bucket(self.head).map(|b| b.end_timestamp)
    }

    /// End date of the tail bucket, if any bucket is live.
    pub fn last_maturity(&self) -> Option<Timestamp> {
        if !self.has_live() {
            return None;
        }
        self.bucket(self.tail).map(|b| b.end_timestamp)
    }

    /// Add `amount` maturing at `end_timestamp`.
    ///
    /// Merges into the live bucket with the same end date if there is one,
    /// otherwise links a new bucket with the next sequential id at its sorted
    /// position. An end date earlier than the head's becomes the new head.
    pub fn insert(
        &mut self,
        amount: Amount,
        end_timestamp: Timestamp,
    ) -> Result<Insertion, ScheduleError> {
        if amount == 0 {
            return Err(ScheduleError::NonPositiveAmount);
        }
        if end_timestamp == 0 {
            return Err(ScheduleError::NonPositiveEndDate);
        }

        // Find the live bucket to link after; NULL means "in front of head".
        let mut after = self.tail;
        if self.has_live() {
            loop {
                let node = *self.get(after)?;
                if node.end_timestamp == end_timestamp {
                    let merged = node
                        .amount
                        .checked_add(amount)
                        .ok_or(ScheduleError::ValueOverflow)?;
                    self.bucket_mut(after)?.amount = merged;
                    return Ok(Insertion {
                        id: after,
                        merged: true,
                    });
                }
                if node.end_timestamp < end_timestamp {
                    break;
                }
                let reached_head = after == self.head;
                after = node.prev;
                if reached_head {
                    break;
                }
            }
        }

        let next = if is_null(after) {
            self.head
        } else {
            self.get(after)?.next
        };
        if !is_null(next) {
            self.get(next)?;
        }

        let id = self.buckets.len() as BucketId + 1;
        self.buckets.push(MaturityBucket {
            amount,
            end_timestamp,
            prev: after,
            next,
        });
        self.dirty.insert(id);

        if !is_null(after) {
            self.bucket_mut(after)?.next = id;
        }
        if is_null(next) {
            self.tail = id;
        } else {
            self.bucket_mut(next)?.prev = id;
        }
        if !self.has_live() || next == self.head {
            self.head = id;
        }

        Ok(Insertion { id, merged: false })
    }

    /// Remove up to `amount` from the bucket maturing at `end_timestamp`.
    ///
    /// The removal is clamped to the bucket's remaining amount and the bucket
    /// stays linked even when it reaches zero. Live buckets are preferred
    /// over retired ones with the same end date.
    pub fn reduce(
        &mut self,
        amount: Amount,
        end_timestamp: Timestamp,
    ) -> Result<Reduction, ScheduleError> {
        if amount == 0 {
            return Err(ScheduleError::NonPositiveAmount);
        }
        if end_timestamp == 0 {
            return Err(ScheduleError::NonPositiveEndDate);
        }

        let mut cursor = self.tail;
        let mut live = self.has_live();
        while !is_null(cursor) {
            let node = *self.get(cursor)?;
            if node.end_timestamp == end_timestamp {
                let removed = amount.min(node.amount);
                self.bucket_mut(cursor)?.amount = node.amount - removed;
                return Ok(Reduction {
                    id: cursor,
                    removed,
                    live,
                });
            }
            if cursor == self.head {
                live = false;
            }
            cursor = node.prev;
        }

        Err(ScheduleError::EntryNotFound(end_timestamp))
    }

    /// Id of the bucket maturing at `end_timestamp`, if any.
    ///
    /// Searches from the tail, so a live bucket wins over a retired one with
    /// the same end date.
    pub fn find(&self, end_timestamp: Timestamp) -> Option<BucketId> {
        let mut cursor = self.tail;
        while let Some(node) = self.bucket(cursor) {
            if node.end_timestamp == end_timestamp {
                return Some(cursor);
            }
            cursor = node.prev;
        }
        None
    }

    /// Move the head cursor to `new_head` after the engine retired the
    /// buckets before it. [`NULL_BUCKET`](crate::constants::NULL_BUCKET) means everything is retired.
    pub fn advance_head(&mut self, new_head: BucketId) -> Result<(), ScheduleError> {
        if !is_null(new_head) {
            self.get(new_head)?;
        }
        self.head = new_head;
        Ok(())
    }

    /// Iterate live buckets from head to tail.
    pub fn live(&self) -> LiveBuckets<'_> {
        LiveBuckets {
            schedule: self,
            cursor: self.head,
        }
    }

    /// Iterate every bucket by id, retired ones included.
    pub fn iter(&self) -> impl Iterator<Item = (BucketId, &MaturityBucket)> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, bucket)| (i as BucketId + 1, bucket))
    }

    /// Sum of live bucket amounts maturing strictly after `timestamp`.
    pub fn active_after(&self, timestamp: Timestamp) -> Amount {
        self.live()
            .filter(|(_, b)| b.end_timestamp > timestamp)
            .map(|(_, b)| b.amount)
            .sum()
    }

    /// Drain the set of buckets modified since the last call.
    pub fn take_dirty(&mut self) -> Vec<(BucketId, MaturityBucket)> {
        std::mem::take(&mut self.dirty)
            .into_iter()
            .filter_map(|id| self.bucket(id).map(|bucket| (id, *bucket)))
            .collect()
    }
}

/// Iterator over the live range of a [`Schedule`].
pub struct LiveBuckets<'a> {
    schedule: &'a Schedule,
    cursor: BucketId,
}

impl<'a> Iterator for LiveBuckets<'a> {
    type Item = (BucketId, &'a MaturityBucket);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor;
        let bucket = self.schedule.bucket(id)?;
        self.cursor = bucket.next;
        Some((id, bucket))
    }
}
