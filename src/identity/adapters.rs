use super::user::{User, UserProfile};

// Field-for-field copy from the legacy profile. The email doubles as the
// username on the cake side; the legacy password hash travels unchanged.
pub fn user_from_profile(p: &UserProfile) -> User {
    User {
        id: p.id,
        username: p.email.clone(),
        email: p.email.clone(),
        first_name: p.firstname.clone(),
        last_name: p.lastname.clone(),
        password: p.password.clone(),
        date_joined: p.created,
    }
}
