use httprpc_common::protocol::error::Result;
use httprpc_common::transport::Connection;
use std::ops::{Deref, DerefMut};

use crate::pool::Pool;

/// Connection checked out of a pool for the duration of one exchange.
///
/// Dropping the guard hands the connection back to its pool. Calling
/// [`set_keep(false)`](Self::set_keep) before that makes the pool drop the
/// connection instead, which is what a caller wants once the connection's
/// stream is in an unknown state (half-written request, failed read).
pub struct ConnectionGuard<'a> {
    pool: &'a dyn Pool,
    conn: Option<Box<dyn Connection>>,
    keep: bool,
}

impl<'a> ConnectionGuard<'a> {
    pub async fn acquire(pool: &'a dyn Pool) -> Result<ConnectionGuard<'a>> {
        let conn = pool.checkout().await?;
        Ok(Self {
            pool,
            conn: Some(conn),
            keep: true,
        })
    }

    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    pub fn keep(&self) -> bool {
        self.keep
    }
}

impl Deref for ConnectionGuard<'_> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("connection is present until the guard drops")
    }
}

impl DerefMut for ConnectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection is present until the guard drops")
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.checkin(conn, self.keep);
        }
    }
}
