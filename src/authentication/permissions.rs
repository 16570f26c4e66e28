use crate::{error::ApiError, jwt::SessionData};

/// Who may perform an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Author,
}

const ACTION_TABLE: &[(ActionType, Access)] = &[
    (ActionType::Register, Access::Public),
    (ActionType::CreateRecipes, Access::Authenticated),
    (ActionType::ManageOwnAccount, Access::Authenticated),
    (ActionType::ManageOwnFavorites, Access::Authenticated),
    (ActionType::ManageOwnCart, Access::Authenticated),
    (ActionType::ManageOwnSubscriptions, Access::Authenticated),
    (ActionType::ManageOwnRecipes, Access::Author),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    Register,

    CreateRecipes,

    ManageOwnAccount,
    ManageOwnFavorites,
    ManageOwnCart,
    ManageOwnSubscriptions,
    ManageOwnRecipes,
}

impl ActionType {
    pub fn access(self) -> Access {
        ACTION_TABLE
            .iter()
            .find_map(|(action, access)| (*action == self).then_some(*access))
            .unwrap_or(Access::Author)
    }

    /// `owner_id` is the author of the object being touched, when there is one.
    pub fn authenticate(
        self,
        session: Option<&SessionData>,
        owner_id: Option<i32>,
    ) -> Result<(), ApiError> {
        match (self.access(), session) {
            (Access::Public, _) => Ok(()),
            (_, None) => Err(ApiError::auth(
                "Authentication credentials were not provided.",
            )),
            (Access::Authenticated, Some(_)) => Ok(()),
            (Access::Author, Some(session)) => match owner_id {
                Some(owner_id) if session.is(owner_id) => Ok(()),
                _ => Err(ApiError::permission(
                    "You do not have permission to perform this action.",
                )),
            },
        }
    }
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType, owner_id: Option<i32>) -> Result<(), ApiError> {
        action.authenticate(Some(self), owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_public() {
        assert_eq!(ActionType::Register.access(), Access::Public);
        assert!(ActionType::Register.authenticate(None, None).is_ok());
    }

    #[test]
    fn toggles_require_a_session() {
        let err = ActionType::ManageOwnFavorites
            .authenticate(None, None)
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));

        let session = SessionData::new(1, "ann");
        assert!(session.authenticate(ActionType::ManageOwnCart, None).is_ok());
    }

    #[test]
    fn recipe_mutation_is_author_only() {
        let author = SessionData::new(1, "ann");
        let stranger = SessionData::new(2, "bob");

        assert!(author
            .authenticate(ActionType::ManageOwnRecipes, Some(1))
            .is_ok());

        let err = stranger
            .authenticate(ActionType::ManageOwnRecipes, Some(1))
            .unwrap_err();
        assert_eq!(err.status(), 403);
    }
}
