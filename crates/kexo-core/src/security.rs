use crate::domain::UserId;

/// Fixed set of user ids allowed to run privileged commands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdminAllowlist {
    ids: Vec<i64>,
}

impl AdminAllowlist {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut ids: Vec<i64> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn allows(&self, user_id: Option<UserId>) -> bool {
        is_authorized(user_id, &self.ids)
    }
}

pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.contains(&user_id.0)
}
