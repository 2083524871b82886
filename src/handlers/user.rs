use axum::extract::Path;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl User {
    fn fake(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("User {}", id),
            email: format!("user{}@example.com", id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

pub(super) async fn get_user(Path(id): Path<String>) -> Json<User> {
    Json(User::fake(&id))
}

pub(super) async fn list_users() -> Json<ListUsersResponse> {
    Json(ListUsersResponse {
        users: vec![User::fake("1"), User::fake("2")],
    })
}

/// Nothing is persisted; the new user always gets id "3"
pub(super) async fn create_user(Json(request): Json<CreateUserRequest>) -> Json<User> {
    Json(User {
        id: "3".to_string(),
        name: request.name,
        email: request.email,
    })
}
