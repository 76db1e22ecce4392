//! Deterministic changes-feed URL construction.

use crate::config::{ConnectionConfig, DatabaseConfig};

pub struct UrlBuilder {
    base: String,
}

impl UrlBuilder {
    /// Pre-render the part of the URL that never changes between reconnects.
    /// Filter params come from a BTreeMap, so their order is stable and a
    /// rebuilt URL is byte-identical to the previous one.
    pub fn new(connection: &ConnectionConfig, database: &DatabaseConfig) -> Self {
        let mut base = format!(
            "{}/{}/_changes?feed=continuous&include_docs=true&heartbeat={}",
            connection.url.trim_end_matches('/'),
            database.database,
            connection.heartbeat_ms
        );

        if let Some(filter) = &database.filter {
            base.push_str(&format!("&filter={}", urlencoding::encode(filter)));
            for (key, value) in &database.filter_params {
                base.push_str(&format!(
                    "&{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                ));
            }
        }
        Self { base }
    }

    pub fn build(&self, last_seq: Option<&str>) -> String {
        match last_seq {
            Some(seq) => format!("{}&since={}", self.base, urlencoding::encode(seq)),
            None => self.base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs(filter: bool) -> (ConnectionConfig, DatabaseConfig) {
        let connection = ConnectionConfig {
            url: "http://some.url".to_string(),
            heartbeat_ms: 20_000,
            ..Default::default()
        };
        let mut database = DatabaseConfig {
            database: "testdb".to_string(),
            ..Default::default()
        };
        if filter {
            database.filter = Some("app/important".to_string());
            database
                .filter_params
                .insert("region".to_string(), "eu west".to_string());
            database
                .filter_params
                .insert("kind".to_string(), "order".to_string());
        }
        (connection, database)
    }

    #[test]
    fn test_url_without_last_seq() {
        let (conn, db) = configs(false);
        let url = UrlBuilder::new(&conn, &db).build(None);
        assert_eq!(
            url,
            "http://some.url/testdb/_changes?feed=continuous&include_docs=true&heartbeat=20000"
        );
    }

    #[test]
    fn test_url_with_last_seq() {
        let (conn, db) = configs(false);
        let url = UrlBuilder::new(&conn, &db).build(Some("1337"));
        assert_eq!(
            url,
            "http://some.url/testdb/_changes?feed=continuous&include_docs=true&heartbeat=20000&since=1337"
        );
    }

    #[test]
    fn test_url_with_filter_params_sorted_and_encoded() {
        let (conn, db) = configs(true);
        let url = UrlBuilder::new(&conn, &db).build(None);
        assert_eq!(
            url,
            "http://some.url/testdb/_changes?feed=continuous&include_docs=true&heartbeat=20000\
             &filter=app%2Fimportant&kind=order&region=eu%20west"
        );
    }

    #[test]
    fn test_multi_part_seq_is_encoded() {
        let (conn, db) = configs(false);
        let url = UrlBuilder::new(&conn, &db).build(Some("[42,\"hash\"]"));
        assert!(url.ends_with("&since=%5B42%2C%22hash%22%5D"));
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let (conn, db) = configs(true);
        let builder = UrlBuilder::new(&conn, &db);
        assert_eq!(builder.build(Some("42")), builder.build(Some("42")));

        let rebuilt = UrlBuilder::new(&conn, &db);
        assert_eq!(builder.build(Some("42")), rebuilt.build(Some("42")));
    }
}
