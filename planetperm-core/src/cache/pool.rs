//! Reusable scratch lists
//!
//! Channel-access computation builds a temporary list for every miss. The
//! pool hands out cleared `Vec`s and takes them back when the guard drops,
//! keeping at most `max_retained` idle lists around.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

#[derive(Debug)]
pub struct ListPool<T> {
    idle: Mutex<Vec<Vec<T>>>,
    max_retained: usize,
}

impl<T> ListPool<T> {
    #[must_use]
    pub const fn new(max_retained: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    /// Borrow an empty list
    pub fn get(&self) -> PooledList<'_, T> {
        let list = self.idle.lock().pop().unwrap_or_default();
        PooledList { list, pool: self }
    }

    /// Number of idle lists currently retained
    #[must_use]
    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn give_back(&self, mut list: Vec<T>) {
        list.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_retained {
            idle.push(list);
        }
    }
}

/// A list on loan from a [`ListPool`]; returned on drop
#[derive(Debug)]
pub struct PooledList<'a, T> {
    list: Vec<T>,
    pool: &'a ListPool<T>,
}

impl<T> Deref for PooledList<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.list
    }
}

impl<T> DerefMut for PooledList<'_, T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.list
    }
}

impl<T> Drop for PooledList<'_, T> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.list));
    }
}
