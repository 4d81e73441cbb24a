use std::collections::HashSet;
use std::sync::Mutex;

use crate::source::ArticleRef;

/// Refs currently being processed within a cycle.
///
/// A task claims a ref before checking the store and holds the claim until
/// it has published and marked (or given up), so two tasks can never both
/// see the same ref as unprocessed.
#[derive(Default)]
pub struct ClaimSet {
    claimed: Mutex<HashSet<ArticleRef>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `article_ref`, or `None` if another task holds it
    pub fn claim(&self, article_ref: &ArticleRef) -> Option<ClaimGuard<'_>> {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.insert(article_ref.clone()) {
            Some(ClaimGuard {
                set: self,
                article_ref: article_ref.clone(),
            })
        } else {
            None
        }
    }

    fn release(&self, article_ref: &ArticleRef) {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        claimed.remove(article_ref);
    }
}

/// Releases its claim when dropped
pub struct ClaimGuard<'a> {
    set: &'a ClaimSet,
    article_ref: ArticleRef,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.set.release(&self.article_ref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let claims = ClaimSet::new();
        let r = ArticleRef::new("a", "https://a.test/1");

        let guard = claims.claim(&r);
        assert!(guard.is_some());
        assert!(claims.claim(&r).is_none());
        assert!(claims.claim(&ArticleRef::new("b", "https://a.test/1")).is_some());

        drop(guard);
        assert!(claims.claim(&r).is_some());
    }
}
