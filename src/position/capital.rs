//! Capital pool
//!
//! One mutex, held only for the scalar debit/credit. The invariant is
//! absolute: available + committed = total and available never goes
//! negative. A violation here is not an error to handle, it is a
//! corrupted book, and the process must stop trading.

use std::sync::Mutex;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Book {
    total: f64,
    available: f64,
}

/// Shared capital book for the whole engine
pub struct CapitalPool {
    book: Mutex<Book>,
}

/// Snapshot for status surfaces
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CapitalSnapshot {
    pub total_sol: f64,
    pub available_sol: f64,
    pub committed_sol: f64,
}

impl CapitalPool {
    pub fn new(total_sol: f64) -> Self {
        Self {
            book: Mutex::new(Book {
                total: total_sol,
                available: total_sol,
            }),
        }
    }

    /// Reserve capital for an entry. Fails with InsufficientCapital when
    /// the pool cannot cover it.
    pub fn debit(&self, amount_sol: f64) -> Result<()> {
        if amount_sol <= 0.0 {
            return Err(Error::InvariantViolation(format!(
                "non-positive capital debit: {amount_sol}"
            )));
        }

        let mut book = self.lock();
        if book.available < amount_sol {
            return Err(Error::InsufficientCapital {
                available: book.available,
                required: amount_sol,
            });
        }
        book.available -= amount_sol;
        Ok(())
    }

    /// Release committed capital, adjusted by realized P&L
    pub fn credit(&self, committed_sol: f64, pnl_sol: f64) -> Result<()> {
        let mut book = self.lock();
        book.available += committed_sol + pnl_sol;
        book.total += pnl_sol;

        if book.available < -1e-9 || book.available > book.total + 1e-9 {
            return Err(Error::InvariantViolation(format!(
                "capital book corrupt: available={} total={}",
                book.available, book.total
            )));
        }
        Ok(())
    }

    pub fn available_sol(&self) -> f64 {
        self.lock().available
    }

    pub fn committed_sol(&self) -> f64 {
        let book = self.lock();
        book.total - book.available
    }

    pub fn snapshot(&self) -> CapitalSnapshot {
        let book = self.lock();
        CapitalSnapshot {
            total_sol: book.total,
            available_sol: book.available,
            committed_sol: book.total - book.available,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Book> {
        match self.book.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
