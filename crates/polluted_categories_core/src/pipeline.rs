use anyhow::Result;
use log::info;

use crate::config::{BotCredentials, ReplicaCredentials, ReportConfig, env_lookup};
use crate::mediawiki::{
    MediaWikiClient, MediaWikiClientConfig, WikiSite, WikiWriteApi, publish_page,
};
use crate::replica::{ReplicaConnection, ReplicaSource, fetch_polluted_categories};
use crate::report::{ReportPage, ReportTable};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: ReportConfig,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedReport {
    pub page: ReportPage,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub title: String,
    pub dry_run: bool,
    pub rows: usize,
    pub bytes: usize,
    pub revision_id: Option<u64>,
    pub no_change: bool,
    pub request_count: usize,
    /// Page text, kept only for dry runs so the caller can print it.
    pub text: Option<String>,
}

impl RunReport {
    fn dry_run(prepared: PreparedReport) -> Self {
        Self {
            title: prepared.page.title,
            dry_run: true,
            rows: prepared.rows,
            bytes: prepared.page.text.len(),
            revision_id: None,
            no_change: false,
            request_count: 0,
            text: Some(prepared.page.text),
        }
    }
}

/// Query the enwiki replica and publish the report to English Wikipedia.
pub fn run_report(options: &RunOptions) -> Result<RunReport> {
    run_report_with(
        options,
        env_lookup,
        |credentials| {
            info!(
                "establishing connection to the replica at {}:{}",
                credentials.host, credentials.port
            );
            ReplicaConnection::connect(credentials)
        },
        |config| {
            let client_config =
                MediaWikiClientConfig::from_config(config, WikiSite::ENGLISH_WIKIPEDIA);
            info!("using MediaWiki API at {}", client_config.api_url);
            MediaWikiClient::new(client_config)
        },
    )
}

/// Credentials are resolved before any I/O. The replica source is dropped
/// before the wiki client is built; a dry run never builds one.
pub fn run_report_with<L, C, S, F, A>(
    options: &RunOptions,
    lookup: L,
    connect: C,
    build_api: F,
) -> Result<RunReport>
where
    L: Fn(&str) -> Option<String>,
    C: FnOnce(&ReplicaCredentials) -> Result<S>,
    S: ReplicaSource,
    F: FnOnce(&ReportConfig) -> Result<A>,
    A: WikiWriteApi,
{
    let replica = ReplicaCredentials::from_lookup(&lookup)?;
    let bot = if options.dry_run {
        None
    } else {
        Some(BotCredentials::from_lookup(&lookup)?)
    };

    let prepared = {
        let mut source = connect(&replica)?;
        prepare_report(&mut source)?
    };

    match bot {
        None => {
            info!("dry run: skipping login and save");
            Ok(RunReport::dry_run(prepared))
        }
        Some(bot) => {
            let mut api = build_api(&options.config)?;
            publish_report(&mut api, &bot, prepared)
        }
    }
}

pub fn prepare_report<S: ReplicaSource>(source: &mut S) -> Result<PreparedReport> {
    let table = ReportTable::new(fetch_polluted_categories(source)?);
    let page = ReportPage::compose(&table);
    info!(
        "composed report with {} rows ({} bytes)",
        table.len(),
        page.text.len()
    );
    Ok(PreparedReport {
        page,
        rows: table.len(),
    })
}

pub fn publish_report<A: WikiWriteApi>(
    api: &mut A,
    credentials: &BotCredentials,
    prepared: PreparedReport,
) -> Result<RunReport> {
    let saved = publish_page(api, credentials, &prepared.page)?;
    Ok(RunReport {
        title: saved.title,
        dry_run: false,
        rows: prepared.rows,
        bytes: prepared.page.text.len(),
        revision_id: saved.revision_id,
        no_change: saved.no_change,
        request_count: api.request_count(),
        text: None,
    })
}
