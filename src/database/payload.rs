use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;

use crate::{
    error::ApiError,
    image::{decode_image, DecodedImage},
    password::PasswordRules,
    schema::Uuid,
    EMAIL_MAX_LENGTH, NAME_MAX_LENGTH, RECIPE_NAME_MAX_LENGTH, RESERVED_USERNAMES,
    USERNAME_MAX_LENGTH,
};

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: i64,
}

/// Recipe body as sent by clients on create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipePayload {
    #[serde(default)]
    pub tags: Vec<Uuid>,
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
    #[serde(default)]
    pub image: Option<String>,
    pub name: String,
    pub text: String,
    pub cooking_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRecipe {
    pub tags: Vec<Uuid>,
    pub ingredients: Vec<(Uuid, i32)>,
    pub image: Option<DecodedImage>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipePayload {
    /// Checks run in a fixed order: tags, ingredient amounts, cooking time, then the rest.
    /// Creation needs an image; an update without one keeps the stored image.
    pub fn validate(self, require_image: bool) -> Result<ValidRecipe, ApiError> {
        if self.tags.is_empty() {
            return Err(ApiError::validation("At least one tag is required."));
        }
        let mut seen = HashSet::new();
        if !self.tags.iter().all(|tag| seen.insert(*tag)) {
            return Err(ApiError::validation("Duplicate tag."));
        }

        if self.ingredients.is_empty() {
            return Err(ApiError::validation("At least one ingredient is required."));
        }
        let mut ingredients = Vec::with_capacity(self.ingredients.len());
        for ingredient in self.ingredients.iter() {
            if ingredient.amount < 1 {
                return Err(ApiError::validation("Amount must be at least 1."));
            }
            let amount = i32::try_from(ingredient.amount)
                .map_err(|_| ApiError::validation("Amount is too large."))?;
            ingredients.push((ingredient.id, amount));
        }
        let mut seen = HashSet::new();
        if !ingredients.iter().all(|(id, _)| seen.insert(*id)) {
            return Err(ApiError::validation("Duplicate ingredient."));
        }

        if self.cooking_time < 1 {
            return Err(ApiError::validation(
                "Cooking time can't be less than 1 minute.",
            ));
        }
        let cooking_time = i32::try_from(self.cooking_time)
            .map_err(|_| ApiError::validation("Cooking time is too large."))?;

        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(ApiError::validation("Recipe name is required."));
        }
        if name.chars().count() > RECIPE_NAME_MAX_LENGTH {
            return Err(ApiError::validation("Recipe name is too long."));
        }
        if self.text.trim().is_empty() {
            return Err(ApiError::validation("Recipe text is required."));
        }

        let image = match self.image.as_deref().map(str::trim) {
            Some(data) if !data.is_empty() => Some(decode_image(data)?),
            _ if require_image => return Err(ApiError::validation("Image is required.")),
            _ => None,
        };

        Ok(ValidRecipe {
            tags: self.tags,
            ingredients,
            image,
            name,
            text: self.text,
            cooking_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl UserPayload {
    pub fn validate(mut self, rules: &PasswordRules) -> Result<Self, ApiError> {
        self.email = self.email.trim().to_lowercase();
        self.username = self.username.trim().to_owned();
        self.first_name = self.first_name.trim().to_owned();
        self.last_name = self.last_name.trim().to_owned();

        if !is_email(&self.email) || self.email.chars().count() > EMAIL_MAX_LENGTH {
            return Err(ApiError::validation("Enter a valid email address."));
        }

        let username_pattern = Regex::new(r"^[\w.@+-]+$")
            .map_err(|_| ApiError::validation("Enter a valid username."))?;
        if !username_pattern.is_match(&self.username)
            || self.username.chars().count() > USERNAME_MAX_LENGTH
        {
            return Err(ApiError::validation(
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            ));
        }
        if RESERVED_USERNAMES.contains(&self.username.to_lowercase().as_str()) {
            return Err(ApiError::validation("This username is reserved."));
        }

        for (field, value) in [("first_name", &self.first_name), ("last_name", &self.last_name)] {
            if value.is_empty() || value.chars().count() > NAME_MAX_LENGTH {
                return Err(ApiError::Validation(format!("Field '{field}' is invalid.")));
            }
        }

        rules.validate(
            &self.password,
            &[
                self.username.as_str(),
                self.email.as_str(),
                self.first_name.as_str(),
                self.last_name.as_str(),
            ],
        )?;

        Ok(self)
    }
}

fn is_email(value: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|pattern| pattern.is_match(value))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordPayload {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagPayload {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TagPayload {
    pub fn validate(mut self) -> Result<Self, ApiError> {
        self.name = self.name.trim().to_owned();
        self.color = self.color.trim().to_uppercase();
        self.slug = self.slug.trim().to_owned();

        if self.name.is_empty() || self.name.chars().count() > NAME_MAX_LENGTH {
            return Err(ApiError::validation("Tag name is invalid."));
        }

        let color = Regex::new(r"^#[0-9A-F]{6}$")
            .map_err(|_| ApiError::validation("Tag color is invalid."))?;
        if !color.is_match(&self.color) {
            return Err(ApiError::validation("Tag color must look like #RRGGBB."));
        }

        let slug = Regex::new(r"^[-a-zA-Z0-9_]{1,50}$")
            .map_err(|_| ApiError::validation("Tag slug is invalid."))?;
        if !slug.is_match(&self.slug) {
            return Err(ApiError::validation("Tag slug is invalid."));
        }

        Ok(self)
    }
}
