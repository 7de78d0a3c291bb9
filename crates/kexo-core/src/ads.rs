use std::sync::RwLock;

use crate::{domain::UserId, security::AdminAllowlist};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdUpdate {
    Applied(String),
    Denied,
}

/// Process-wide advertising text appended to every outgoing caption.
///
/// Shared behind an `Arc`; a running job reads it when composing its
/// caption and may see an update made after the job started.
#[derive(Debug)]
pub struct AdTextStore {
    text: RwLock<String>,
    admins: AdminAllowlist,
}

impl AdTextStore {
    pub fn new(initial: impl Into<String>, admins: AdminAllowlist) -> Self {
        Self {
            text: RwLock::new(initial.into()),
            admins,
        }
    }

    pub fn get(&self) -> String {
        self.text
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Overwrite the ad text if `user` is an admin; otherwise leave it unchanged.
    pub fn set(&self, user: Option<UserId>, text: &str) -> AdUpdate {
        if !self.admins.allows(user) {
            return AdUpdate::Denied;
        }
        let mut guard = self
            .text
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = text.to_string();
        AdUpdate::Applied(guard.clone())
    }

    pub fn admins(&self) -> &AdminAllowlist {
        &self.admins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AdTextStore {
        AdTextStore::new("", AdminAllowlist::new([100]))
    }

    #[test]
    fn admin_overwrites_text() {
        let ads = store();
        assert_eq!(
            ads.set(Some(UserId(100)), "Buy now!"),
            AdUpdate::Applied("Buy now!".to_string())
        );
        assert_eq!(ads.get(), "Buy now!");

        ads.set(Some(UserId(100)), "");
        assert_eq!(ads.get(), "");
    }

    #[test]
    fn non_admin_is_denied_and_text_unchanged() {
        let ads = AdTextStore::new("default ad", AdminAllowlist::new([100]));
        assert_eq!(ads.set(Some(UserId(5)), "Buy now!"), AdUpdate::Denied);
        assert_eq!(ads.set(None, "Buy now!"), AdUpdate::Denied);
        assert_eq!(ads.get(), "default ad");
    }

    #[test]
    fn concurrent_readers_see_a_complete_value() {
        let ads = std::sync::Arc::new(store());
        let writer = {
            let ads = ads.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    ads.set(Some(UserId(100)), &format!("ad {i}"));
                }
            })
        };
        for _ in 0..100 {
            let v = ads.get();
            assert!(v.is_empty() || v.starts_with("ad "));
        }
        writer.join().unwrap();
        assert_eq!(ads.get(), "ad 99");
    }
}
