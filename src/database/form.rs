use std::str::FromStr;

use potion::Error;

use super::error::TypeError;

/// Raw query-string pairs, in request order. Keys may repeat (`?tags=a&tags=b`).
pub type FormData = Vec<(String, String)>;

pub struct Form {
    inner: Vec<(String, String)>,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    fn last(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Blank values count as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.last(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }

    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_e| Error::from(TypeError::new(&format!("Invalid number for '{key}'")))),
            None => Ok(None),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, Error> {
        match self.get_str(key).map(|v| v.to_lowercase()) {
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(Error::from(TypeError::new(&format!("Invalid boolean for '{key}'")))),
            },
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form::from_data(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn repeated_keys_are_collected_in_order() {
        let form = form(&[("tags", "breakfast"), ("page", "2"), ("tags", "lunch")]);

        assert_eq!(form.get_all("tags"), vec!["breakfast", "lunch"]);
        assert!(form.get_all("author").is_empty());
    }

    #[test]
    fn numbers_parse_or_fail() {
        let form = form(&[("page", "3"), ("limit", "abc"), ("author", " ")]);

        assert_eq!(form.get_number::<i64>("page").ok().flatten(), Some(3));
        assert!(form.get_number::<i64>("limit").is_err());
        assert_eq!(form.get_number::<i32>("author").ok().flatten(), None);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let form = form(&[("is_favorited", "1"), ("is_in_shopping_cart", "False"), ("x", "maybe")]);

        assert_eq!(form.get_bool("is_favorited").ok().flatten(), Some(true));
        assert_eq!(form.get_bool("is_in_shopping_cart").ok().flatten(), Some(false));
        assert_eq!(form.get_bool("missing").ok().flatten(), None);
        assert!(form.get_bool("x").is_err());
    }
}
