pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;
pub const DEFAULT_JWT_LIFETIME_HOURS: i64 = 24;

pub const DEFAULT_MEDIA_ROOT: &str = "media";
pub const DEFAULT_MEDIA_URL: &str = "/media/";
pub const RECIPE_IMAGE_DIR: &str = "recipes";

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";
pub const SHOPPING_LIST_HEADER: &str = "List of ingredients for your recipes:";

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const NAME_MAX_LENGTH: usize = 150;
pub const RECIPE_NAME_MAX_LENGTH: usize = 200;

/// Usernames that would shadow a fixed route under `/users/`.
pub const RESERVED_USERNAMES: &[&str] = &["me"];

pub const IMAGE_FORMATS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Rejected outright by the password rules, compared case-insensitively.
pub const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty123",
    "qwertyuiop",
    "iloveyou",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "welcome1",
    "admin123",
    "letmein1",
    "abc12345",
    "11111111",
    "00000000",
    "passw0rd",
    "trustno1",
];
