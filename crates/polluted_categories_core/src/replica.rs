use anyhow::{Context, Result, anyhow};
use log::info;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder};

use crate::config::ReplicaCredentials;

pub const REPLICA_DATABASE: &str = "enwiki_p";
pub const NS_DRAFT: i32 = 118;

/// Substrings of `cl_to` that mark maintenance, tracking and AfC categories.
/// Matched case-sensitively; `cl_to` is a binary column on the replicas.
pub const EXCLUDED_CATEGORY_PATTERNS: [&str; 12] = [
    "AfC", "raft", "Pages", "pages", "edirect", "CS1", "deletion", "rticles", "emplate", "with",
    "tracking", "nfobox",
];

/// One category and the number of draft pages filed in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub name: String,
    pub members: u64,
}

impl CategoryRow {
    pub fn new(name: impl Into<String>, members: u64) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }
}

pub trait ReplicaSource {
    fn category_rows(&mut self, sql: &str) -> Result<Vec<CategoryRow>>;
}

impl<S: ReplicaSource + ?Sized> ReplicaSource for &mut S {
    fn category_rows(&mut self, sql: &str) -> Result<Vec<CategoryRow>> {
        (**self).category_rows(sql)
    }
}

/// Open session against the `enwiki_p` replica. The socket closes on drop.
pub struct ReplicaConnection {
    conn: Conn,
}

impl ReplicaConnection {
    pub fn connect(credentials: &ReplicaCredentials) -> Result<Self> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(credentials.host.clone()))
            .tcp_port(credentials.port)
            .user(Some(credentials.username.clone()))
            .pass(Some(credentials.password.clone()))
            .db_name(Some(REPLICA_DATABASE));
        let conn = Conn::new(opts).with_context(|| {
            format!(
                "failed to connect to replica {}:{} as {}",
                credentials.host, credentials.port, credentials.username
            )
        })?;
        Ok(Self { conn })
    }
}

impl ReplicaSource for ReplicaConnection {
    fn category_rows(&mut self, sql: &str) -> Result<Vec<CategoryRow>> {
        let result = self
            .conn
            .query_iter(sql)
            .context("polluted categories query failed")?;

        let mut rows = Vec::new();
        for row in result {
            let row = row.context("failed to read replica result row")?;
            let (name, members): (Vec<u8>, u64) = mysql::from_row_opt(row)
                .map_err(|error| anyhow!("unexpected replica row shape: {error}"))?;
            rows.push(CategoryRow {
                name: decode_category_name(name)?,
                members,
            });
        }
        Ok(rows)
    }
}

/// Aggregate query over draft-namespace category memberships, largest first.
pub fn polluted_categories_sql() -> String {
    let filters = EXCLUDED_CATEGORY_PATTERNS
        .iter()
        .map(|pattern| format!("\nAND cl_to NOT LIKE '%{pattern}%'"))
        .collect::<String>();
    format!(
        "SELECT cl_to, COUNT(*) AS members
FROM categorylinks
WHERE cl_from IN (
    SELECT page_id
    FROM page
    WHERE page_namespace = {NS_DRAFT}
){filters}
GROUP BY cl_to
ORDER BY COUNT(*) DESC"
    )
}

pub fn fetch_polluted_categories<S: ReplicaSource>(source: &mut S) -> Result<Vec<CategoryRow>> {
    info!("running query to fetch polluted categories");
    let rows = source.category_rows(&polluted_categories_sql())?;
    info!("query returned {} categories", rows.len());
    Ok(rows)
}

fn decode_category_name(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw).map_err(|error| {
        anyhow!(
            "category name is not valid UTF-8: {}",
            String::from_utf8_lossy(error.as_bytes())
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{
        CategoryRow, EXCLUDED_CATEGORY_PATTERNS, NS_DRAFT, decode_category_name,
        fetch_polluted_categories, polluted_categories_sql,
    };
    use crate::testing::SqliteReplica;

    #[test]
    fn sql_lists_every_excluded_pattern_once() {
        let sql = polluted_categories_sql();
        for pattern in EXCLUDED_CATEGORY_PATTERNS {
            let clause = format!("AND cl_to NOT LIKE '%{pattern}%'");
            assert_eq!(sql.matches(&clause).count(), 1, "clause for {pattern}");
        }
        assert!(sql.contains(&format!("page_namespace = {NS_DRAFT}")));
        assert!(sql.trim_end().ends_with("ORDER BY COUNT(*) DESC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn query_counts_draft_memberships_in_descending_order() {
        let mut replica = SqliteReplica::new();
        replica.add_page(1, NS_DRAFT);
        replica.add_page(2, NS_DRAFT);
        replica.add_page(3, NS_DRAFT);
        replica.add_page(10, 0);
        for page in [1, 2, 3] {
            replica.add_membership(page, "Foo_bar");
        }
        replica.add_membership(1, "Baz");
        replica.add_membership(2, "Baz");
        replica.add_membership(3, "People_WITH_hats");
        replica.add_membership(10, "Main_only");
        replica.add_membership(10, "Foo_bar");

        let rows = fetch_polluted_categories(&mut replica).expect("query");
        assert_eq!(
            rows,
            vec![
                CategoryRow::new("Foo_bar", 3),
                CategoryRow::new("Baz", 2),
                CategoryRow::new("People_WITH_hats", 1),
            ]
        );
    }

    #[test]
    fn query_excludes_categories_matching_any_pattern() {
        let mut replica = SqliteReplica::new();
        replica.add_page(1, NS_DRAFT);
        for name in [
            "Draft_articles",
            "Short_pages",
            "AfC_submissions_by_date",
            "Pages_using_infobox",
            "Redirects_from_moves",
            "CS1_maint:_archived_copy",
            "Candidates_for_speedy_deletion",
            "Articles_needing_sources",
            "Webarchive_template_wayback_links",
            "People_with_hats",
            "Hidden_tracking_categories",
            "Infobox_person",
            "Living_people",
        ] {
            replica.add_membership(1, name);
        }

        let rows = fetch_polluted_categories(&mut replica).expect("query");
        assert_eq!(rows, vec![CategoryRow::new("Living_people", 1)]);
    }

    #[test]
    fn query_returns_empty_when_everything_is_filtered() {
        let mut replica = SqliteReplica::new();
        for page in 1..=5 {
            replica.add_page(page, NS_DRAFT);
            replica.add_membership(page, "Draft_articles");
        }
        replica.add_membership(1, "Short_pages");
        replica.add_membership(2, "Short_pages");

        let rows = fetch_polluted_categories(&mut replica).expect("query");
        assert!(rows.is_empty());
    }

    #[test]
    fn decode_category_name_rejects_invalid_utf8() {
        assert_eq!(
            decode_category_name(b"Caf\xc3\xa9s".to_vec()).expect("valid"),
            "Cafés"
        );
        let error = decode_category_name(vec![0x41, 0xff]).expect_err("must fail");
        assert!(error.to_string().contains("not valid UTF-8"));
    }
}
