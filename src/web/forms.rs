//! Form structs for the application's HTML forms.

use crate::form::{FormTarget, Slot};
use crate::validator::{self, Validator, EMAIL_RX};

/// Expiry choices offered by the create form, in days.
pub const PERMITTED_EXPIRES: [i64; 3] = [1, 7, 365];

const BLANK: &str = "This field cannot be blank";

#[derive(Clone, Debug, Default)]
pub struct SnippetForm {
    pub title: String,
    pub content: String,
    pub expires: i64,
    pub validator: Validator,
}

impl SnippetForm {
    /// The blank form shown by `GET /snippet/create`.
    pub fn initial() -> Self {
        Self { expires: 365, ..Self::default() }
    }

    pub fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(validator::not_blank(&self.title), "title", BLANK);
        v.check_field(
            validator::max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(validator::not_blank(&self.content), "content", BLANK);
        v.check_field(
            validator::permitted_value(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
    }
}

impl FormTarget for SnippetForm {
    fn slots(&mut self) -> Vec<(&'static str, Slot<'_>)> {
        vec![
            ("title", Slot::Text(&mut self.title)),
            ("content", Slot::Text(&mut self.content)),
            ("expires", Slot::Int(&mut self.expires)),
        ]
    }
}

#[derive(Clone, Debug, Default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub validator: Validator,
}

impl SignupForm {
    pub fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(validator::not_blank(&self.name), "name", BLANK);
        v.check_field(validator::not_blank(&self.email), "email", BLANK);
        v.check_field(
            validator::matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(validator::not_blank(&self.password), "password", BLANK);
        v.check_field(
            validator::min_chars(&self.password, 8),
            "password",
            "This field must be at least 8 characters long",
        );
    }
}

impl FormTarget for SignupForm {
    fn slots(&mut self) -> Vec<(&'static str, Slot<'_>)> {
        vec![
            ("name", Slot::Text(&mut self.name)),
            ("email", Slot::Text(&mut self.email)),
            ("password", Slot::Text(&mut self.password)),
        ]
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub validator: Validator,
}

impl LoginForm {
    pub fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(validator::not_blank(&self.email), "email", BLANK);
        v.check_field(
            validator::matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(validator::not_blank(&self.password), "password", BLANK);
    }
}

impl FormTarget for LoginForm {
    fn slots(&mut self) -> Vec<(&'static str, Slot<'_>)> {
        vec![
            ("email", Slot::Text(&mut self.email)),
            ("password", Slot::Text(&mut self.password)),
        ]
    }
}
