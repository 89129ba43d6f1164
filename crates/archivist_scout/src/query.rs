//! Read side used by the web layer.
//!
//! Reads only committed rows and never takes a scan lock.

use crate::error::Result;
use archivist_db::{ArchiveDb, PostPage, StoredPost, UserSummary};

#[derive(Clone)]
pub struct QueryService {
    db: ArchiveDb,
    page_size: u64,
}

impl QueryService {
    pub fn new(db: ArchiveDb, page_size: u64) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Posts newest first, ties broken by descending numeric post id.
    pub async fn list_posts(&self, username: &str, offset: u64, limit: u64) -> Result<PostPage> {
        Ok(self.db.list_posts(username, offset, limit).await?)
    }

    /// 1-based page of `page_size` posts. Page 0 is treated as page 1.
    pub async fn list_page(&self, username: &str, page: u64) -> Result<PostPage> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(self.page_size);
        self.list_posts(username, offset, self.page_size).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        Ok(self.db.list_users().await?)
    }

    pub async fn count_posts(&self, username: &str) -> Result<u64> {
        Ok(self.db.count_posts(username).await?)
    }

    pub async fn get_post(&self, username: &str, post_id: &str) -> Result<Option<StoredPost>> {
        Ok(self.db.get_post(username, post_id).await?)
    }
}
