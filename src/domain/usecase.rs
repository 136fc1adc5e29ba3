//! User use cases.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::error::{AppError, ErrorKind, FieldPath};
use crate::domain::ports::{StoreError, UsersRepository};
use crate::domain::user::{User, MAX_NAME_LEN};

pub const USER_NOT_FOUND_CODE: &str = "user:not-found";

#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserOutput {
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct UpdateUserInput {
    pub id: Uuid,
    pub name: String,
}

/// Application service over the users repository.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UsersRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UsersRepository>) -> Self {
        Self { users }
    }

    pub async fn create_user(&self, input: CreateUserInput) -> Result<CreateUserOutput, AppError> {
        const OPERATION: &str = "UseCase.CreateUser";

        let name = validate_name(&input.name).map_err(|e| e.context(OPERATION))?;
        let user = User::new(name);

        self.users
            .create(&user)
            .await
            .map_err(|e| store_error(e, "Repository.Users.Create").context(OPERATION))?;

        Ok(CreateUserOutput { user_id: user.id })
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User, AppError> {
        const OPERATION: &str = "UseCase.GetUser";

        self.users
            .get_by_id(id)
            .await
            .map_err(|e| store_error(e, "Repository.Users.GetUserByID").context(OPERATION))
    }

    pub async fn update_user(&self, input: UpdateUserInput) -> Result<(), AppError> {
        const OPERATION: &str = "UseCase.UpdateUser";

        let name = validate_name(&input.name).map_err(|e| e.context(OPERATION))?;
        let now = Utc::now();
        let user = User {
            id: input.id,
            name,
            created_at: now,
            updated_at: now,
        };

        self.users
            .update(&user)
            .await
            .map_err(|e| store_error(e, "Repository.Users.Update").context(OPERATION))
    }
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let field = FieldPath::new(["name"]);
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(&field, "required", "cannot be blank"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation(
            &field,
            "length-out-of-range",
            &format!("the length must be no more than {MAX_NAME_LEN}"),
        ));
    }
    Ok(trimmed.to_owned())
}

fn store_error(err: StoreError, operation: &'static str) -> AppError {
    match err {
        StoreError::NotFound => {
            AppError::not_found(USER_NOT_FOUND_CODE, "user not found").context(operation)
        }
        StoreError::Unavailable(_) => AppError::of_kind(ErrorKind::Internal)
            .with_source(err)
            .context(operation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{classify, Classification};
    use crate::outbound::memory_store::MemoryUserStore;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryUserStore::new()))
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let svc = service();
        let out = svc
            .create_user(CreateUserInput { name: "  Ada  ".into() })
            .await
            .unwrap();

        let user = svc.get_user(out.user_id).await.unwrap();
        assert_eq!(user.name, "Ada");
    }

    #[tokio::test]
    async fn test_get_missing_user_is_expected_not_found() {
        let err = service().get_user(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), USER_NOT_FOUND_CODE);
        assert_eq!(classify(&err), Classification::Expected);
        assert!(err.to_string().starts_with("UseCase.GetUser -> Repository.Users.GetUserByID"));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let err = service()
            .create_user(CreateUserInput { name: "   ".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "name:required");
        assert_eq!(err.message(), "name cannot be blank");
    }

    #[tokio::test]
    async fn test_update_sets_name() {
        let svc = service();
        let out = svc
            .create_user(CreateUserInput { name: "Ada".into() })
            .await
            .unwrap();

        svc.update_user(UpdateUserInput { id: out.user_id, name: "Grace".into() })
            .await
            .unwrap();

        let user = svc.get_user(out.user_id).await.unwrap();
        assert_eq!(user.name, "Grace");
        assert!(user.updated_at >= user.created_at);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let err = service()
            .update_user(UpdateUserInput { id: Uuid::new_v4(), name: "Grace".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
