use std::env;

/// Environment variable holding the PostgreSQL connection URL.
pub const DATABASE_URL_ENV: &str = "MEALS_DATABASE_URL";

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL, including the database name.
    pub database_url: String,
}

impl DbConfig {
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/meals";

    /// Read `MEALS_DATABASE_URL`, falling back to [`Self::DEFAULT_URL`].
    pub fn from_env() -> Self {
        let database_url =
            env::var(DATABASE_URL_ENV).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self { database_url }
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// The last path segment of the URL, ignoring any query string.
    pub fn database_name(&self) -> Option<&str> {
        let without_query = self
            .database_url
            .split_once('?')
            .map_or(self.database_url.as_str(), |(head, _)| head);
        without_query
            .rsplit_once('/')
            .map(|(_, name)| name)
            .filter(|name| !name.is_empty() && !name.contains(':'))
    }

    /// URL of the `postgres` maintenance database on the same server.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => format!("{}/postgres", &self.database_url[..pos]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_is_last_segment() {
        let cfg = DbConfig::new("postgresql://localhost:5432/school_meals");
        assert_eq!(cfg.database_name(), Some("school_meals"));
    }

    #[test]
    fn database_name_ignores_query_string() {
        let cfg = DbConfig::new("postgresql://db:5432/meals?sslmode=require");
        assert_eq!(cfg.database_name(), Some("meals"));
    }

    #[test]
    fn database_name_missing() {
        let cfg = DbConfig::new("postgresql://localhost:5432/");
        assert_eq!(cfg.database_name(), None);
    }

    #[test]
    fn maintenance_url_points_at_postgres() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://localhost:5432/postgres"
        );
    }
}
