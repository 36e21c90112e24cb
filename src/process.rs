use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::parse::parse_page;
use crate::report::{report_path, ReportWriter};
use crate::request::{page_windows, PageFetcher, PageWindow};
use crate::{info_time, Config, Error, Result};

/// Everything needed to produce one country's report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryJob {
    pub country: String,
    /// Records wanted. Only whole pages are requested.
    pub count: u32,
    pub start: u32,
}

/// What a finished job wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryReport {
    pub country: String,
    pub path: PathBuf,
    pub rows: usize,
    /// Pages dropped because their body wasn't well-formed XML.
    pub skipped_pages: usize,
}

impl CountryJob {
    pub fn windows(&self, page_size: u32) -> Vec<PageWindow> {
        page_windows(&self.country, self.count, self.start, page_size)
    }

    pub fn output_path(&self, dir: &Path) -> PathBuf {
        report_path(dir, self.count, &self.country)
    }

    /// Fetches every page in ascending offset order and writes the rows in fetch order.
    /// The report is flushed whether or not a page fails; a partial file stays on disk.
    pub async fn run(
        &self,
        fetcher: &PageFetcher,
        output_dir: &Path,
        page_size: u32,
    ) -> Result<CountryReport> {
        let path = self.output_path(output_dir);
        let mut report = ReportWriter::create(&path)?;

        let outcome = self.fetch_into(&mut report, fetcher, page_size).await;
        let flushed = report.flush();
        let skipped_pages = outcome?;
        flushed?;

        Ok(CountryReport {
            country: self.country.clone(),
            path,
            rows: report.rows(),
            skipped_pages,
        })
    }

    async fn fetch_into<W: std::io::Write>(
        &self,
        report: &mut ReportWriter<W>,
        fetcher: &PageFetcher,
        page_size: u32,
    ) -> Result<usize> {
        let mut skipped = 0;
        for window in self.windows(page_size) {
            let start_time = Local::now();
            let body = fetcher.fetch(&window).await?;
            let start = window.start;

            let records = match parse_page(Arc::new(body), window).await {
                Ok(records) => records,
                Err(err @ Error::MalformedResponse { .. }) => {
                    tracing::warn!(country = %self.country, start, "skipping page: {err}");
                    skipped += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            if records.is_empty() {
                info_time!("found EMPTY page for {} at {start}", self.country);
                continue;
            }

            report.write_all(&records)?;
            info_time!(
                start_time,
                "Processed {} page at {start}: {} sites",
                self.country,
                records.len()
            );
        }
        Ok(skipped)
    }
}

/// One job per configured country.
pub fn jobs(config: &Config) -> Vec<CountryJob> {
    config
        .countries
        .iter()
        .map(|country| CountryJob {
            country: country.clone(),
            count: config.count,
            start: config.start,
        })
        .collect()
}

/// Pulls every configured country's report.
///
/// Countries run concurrently up to `max_concurrency`; pages inside a country
/// stay sequential. A failing country doesn't stop the others, but the run
/// then ends with [`Error::CountriesFailed`].
pub async fn run(config: Config) -> Result<Vec<CountryReport>> {
    let fetcher = PageFetcher::new(&config)?;
    run_with_fetcher(config, fetcher).await
}

/// Like [`run`], with a caller supplied fetcher. The config is validated here.
pub async fn run_with_fetcher(config: Config, fetcher: PageFetcher) -> Result<Vec<CountryReport>> {
    config.validate()?;
    let start_time = Local::now();
    if config.count % config.page_size != 0 {
        tracing::warn!(
            count = config.count,
            page_size = config.page_size,
            "count is not a multiple of the page size, only {} records per country will be requested",
            config.pages_per_country() * config.page_size
        );
    }
    info_time!(
        "Generating reports of Top {} sites for: {}",
        config.count,
        config.countries.join(",")
    );

    tokio::fs::create_dir_all(&config.output_dir).await?;

    let fetcher = Arc::new(fetcher);
    let permits = Arc::new(Semaphore::new(config.max_concurrency));
    let output_dir = Arc::new(config.output_dir.clone());
    let page_size = config.page_size;

    let mut task_set = JoinSet::new();
    for (idx, job) in jobs(&config).into_iter().enumerate() {
        task_set.spawn({
            let fetcher = fetcher.clone();
            let permits = permits.clone();
            let output_dir = output_dir.clone();

            async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let res = job.run(&fetcher, &output_dir, page_size).await;
                (idx, job.country, res)
            }
        });
    }

    let mut reports = Vec::with_capacity(config.countries.len());
    let mut failed = Vec::new();
    while let Some(task) = task_set.join_next().await {
        let (idx, country, res) = task?;
        match res {
            Ok(report) => {
                info_time!(
                    "Wrote top {} {} sites to: {}",
                    report.rows,
                    country,
                    report.path.display()
                );
                reports.push((idx, report));
            }
            Err(err) => {
                tracing::error!(%country, "report failed: {err}");
                failed.push((idx, country));
            }
        }
    }

    info_time!(start_time, "All reports done.");

    if !failed.is_empty() {
        failed.sort_unstable();
        return Err(Error::CountriesFailed(
            failed.into_iter().map(|(_, c)| c).collect(),
        ));
    }
    reports.sort_unstable_by_key(|(idx, _)| *idx);
    Ok(reports.into_iter().map(|(_, r)| r).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Credentials;

    #[test]
    fn one_job_per_country() {
        let creds = Credentials::new(Some("AKID".into()), Some("secret".into())).unwrap();
        let mut config = Config::new(creds);
        config.countries = vec!["us".into(), "jp".into()];
        config.count = 200;
        config.start = 11;

        let jobs = jobs(&config);
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs[1],
            CountryJob {
                country: "jp".into(),
                count: 200,
                start: 11,
            }
        );
        let starts: Vec<u32> = jobs[1].windows(100).iter().map(|w| w.start).collect();
        assert_eq!(starts, [11, 111]);
        assert_eq!(
            jobs[0].output_path(Path::new(".")),
            Path::new(".").join("alexa_top200_us.csv")
        );
    }
}
