use crate::model::{Id, post::PostMarker};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;

pub const USER_NAME_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub name: UserName,
    /// Ids of the user's posts in creation order.
    pub posts: Vec<Id<PostMarker>>,
}

/// The populated form of a post's creator.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct UserSummary {
    pub id: Id<UserMarker>,
    pub name: UserName,
}

impl User {
    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn push_post(&mut self, post_id: Id<PostMarker>) {
        self.posts.push(post_id);
    }

    /// Removes every reference to `post_id`, returning whether any existed.
    pub fn pull_post(&mut self, post_id: Id<PostMarker>) -> bool {
        let before = self.posts.len();
        self.posts.retain(|id| *id != post_id);
        self.posts.len() != before
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct UserName(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The user name is invalid: {0:?}")]
pub struct InvalidUserNameError(String);

impl UserName {
    pub fn new(name: String) -> Result<Self, InvalidUserNameError> {
        let length = name.chars().count();
        if length > 0 && length <= USER_NAME_MAX_LEN {
            Ok(UserName(name))
        } else {
            Err(InvalidUserNameError(name))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        UserName::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"UserName"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        user::{USER_NAME_MAX_LEN, User, UserName},
    };

    #[test]
    fn user_name_length() {
        assert!(UserName::new("Max".to_owned()).is_ok());
        assert!(UserName::new("ü".repeat(USER_NAME_MAX_LEN)).is_ok());
        assert!(UserName::new("a".repeat(USER_NAME_MAX_LEN + 1)).is_err());
        assert!(UserName::new(String::new()).is_err());
        assert!(serde_json::from_str::<UserName>("\"\"").is_err());
    }

    #[test]
    fn push_and_pull_posts() {
        let mut user = User {
            id: Id::from(1_u64),
            name: UserName::new("Max".to_owned()).unwrap(),
            posts: vec![Id::from(10_u64), Id::from(11_u64)],
        };

        user.push_post(Id::from(12_u64));
        assert_eq!(user.posts, [Id::from(10_u64), Id::from(11_u64), Id::from(12_u64)]);

        assert!(user.pull_post(Id::from(11_u64)));
        assert!(!user.pull_post(Id::from(11_u64)));
        assert_eq!(user.posts, [Id::from(10_u64), Id::from(12_u64)]);
    }
}
