//! `xavva audit`: look up published advisories for the jars an app ships.

use std::fs;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::build::Deployer;
use crate::config::{AppConfig, CliOverrides};
use crate::output;

use super::load_config;

pub const OSV_QUERY_URL: &str = "https://api.osv.dev/v1/query";
const CHUNK_SIZE: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

static JAR_NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.+)-(\d[\w.\-]*)\.jar$").ok());

/// Coordinates recovered from a jar file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarCoordinates {
    pub jar: String,
    pub artifact: String,
    pub version: String,
}

/// `jackson-databind-2.13.0.jar` → (`jackson-databind`, `2.13.0`).
pub fn parse_jar_name(jar: &str) -> Option<JarCoordinates> {
    let caps = JAR_NAME_RE.as_ref()?.captures(jar)?;
    Some(JarCoordinates {
        jar: jar.to_string(),
        artifact: caps.get(1)?.as_str().to_string(),
        version: caps.get(2)?.as_str().to_string(),
    })
}

#[derive(Debug, Serialize)]
struct OsvQuery<'a> {
    version: &'a str,
    package: OsvPackage<'a>,
}

#[derive(Debug, Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVuln>,
}

#[derive(Debug, Deserialize)]
struct OsvVuln {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    database_specific: Option<DatabaseSpecific>,
    #[serde(default)]
    affected: Vec<Affected>,
}

#[derive(Debug, Deserialize)]
struct DatabaseSpecific {
    #[serde(default)]
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Affected {
    #[serde(default)]
    ranges: Vec<Range>,
}

#[derive(Debug, Deserialize)]
struct Range {
    #[serde(default)]
    events: Vec<RangeEvent>,
}

#[derive(Debug, Deserialize)]
struct RangeEvent {
    #[serde(default)]
    fixed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vulnerability {
    pub id: String,
    pub summary: String,
    pub severity: String,
    pub fixed_in: Option<String>,
}

impl From<OsvVuln> for Vulnerability {
    fn from(v: OsvVuln) -> Self {
        let details = v.details.unwrap_or_default();
        let severity = v
            .database_specific
            .and_then(|d| d.severity)
            .unwrap_or_else(|| infer_severity(&details).to_string());
        let summary = v.summary.filter(|s| !s.is_empty()).unwrap_or_else(|| {
            let cut: String = details.chars().take(100).collect();
            if details.chars().count() > 100 {
                format!("{cut}...")
            } else {
                cut
            }
        });
        let fixed_in = v
            .affected
            .into_iter()
            .next()
            .and_then(|a| a.ranges.into_iter().next())
            .and_then(|r| r.events.into_iter().find_map(|e| e.fixed));
        Self {
            id: v.id,
            summary,
            severity,
            fixed_in,
        }
    }
}

fn infer_severity(details: &str) -> &'static str {
    let details = details.to_lowercase();
    if details.contains("critical") {
        "CRITICAL"
    } else if details.contains("high") {
        "HIGH"
    } else if details.contains("moderate") || details.contains("medium") {
        "MEDIUM"
    } else {
        "UNKNOWN"
    }
}

pub fn parse_osv_response(body: &str) -> Result<Vec<Vulnerability>, serde_json::Error> {
    let response: OsvResponse = serde_json::from_str(body)?;
    Ok(response.vulns.into_iter().map(Vulnerability::from).collect())
}

/// Why an advisory lookup produced no answer.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("advisory service answered {0}")]
    Status(reqwest::StatusCode),

    #[error("unreadable response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Advisories for one artifact.
async fn query_osv(
    client: &reqwest::Client,
    url: &str,
    coords: &JarCoordinates,
) -> Result<Vec<Vulnerability>, LookupError> {
    let query = OsvQuery {
        version: &coords.version,
        package: OsvPackage {
            name: &coords.artifact,
            ecosystem: "Maven",
        },
    };
    let response = client.post(url).json(&query).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(LookupError::Status(status));
    }
    let body = response.text().await?;
    Ok(parse_osv_response(&body)?)
}

type LookupResult = (JarCoordinates, Result<Vec<Vulnerability>, LookupError>);

/// Lookups split by outcome, in jar order.
#[derive(Debug, Default)]
pub struct AuditReport {
    pub vulnerable: Vec<(JarCoordinates, Vec<Vulnerability>)>,
    pub failed: Vec<(JarCoordinates, LookupError)>,
    pub clean: usize,
}

impl AuditReport {
    fn from_results(results: Vec<LookupResult>) -> Self {
        let mut report = Self::default();
        for (jar, result) in results {
            match result {
                Ok(vulns) if vulns.is_empty() => report.clean += 1,
                Ok(vulns) => report.vulnerable.push((jar, vulns)),
                Err(e) => report.failed.push((jar, e)),
            }
        }
        report
    }

    fn checked(&self) -> usize {
        self.clean + self.vulnerable.len()
    }

    fn advisories(&self) -> usize {
        self.vulnerable.iter().map(|(_, v)| v.len()).sum()
    }

    /// `None` when every lookup answered and nothing was found.
    fn failure_notice(&self) -> Option<String> {
        (!self.failed.is_empty()).then(|| {
            format!(
                "{} of {} lookups failed; those jars were not checked",
                self.failed.len(),
                self.failed.len() + self.checked()
            )
        })
    }
}

async fn lookup_all(
    client: &reqwest::Client,
    url: &str,
    coords: Vec<JarCoordinates>,
) -> Result<Vec<LookupResult>, tokio::task::JoinError> {
    let mut results = Vec::with_capacity(coords.len());
    for chunk in coords.chunks(CHUNK_SIZE) {
        let mut set = JoinSet::new();
        for (idx, jar) in chunk.iter().cloned().enumerate() {
            let client = client.clone();
            let url = url.to_string();
            set.spawn(async move {
                let result = query_osv(&client, &url, &jar).await;
                if let Err(e) = &result {
                    tracing::warn!(jar = %jar.jar, err = %e, "Advisory lookup failed");
                }
                (idx, jar, result)
            });
        }
        let mut chunk_results = Vec::with_capacity(chunk.len());
        while let Some(joined) = set.join_next().await {
            chunk_results.push(joined?);
        }
        chunk_results.sort_by_key(|(idx, _, _)| *idx);
        results.extend(chunk_results.into_iter().map(|(_, jar, r)| (jar, r)));
    }
    Ok(results)
}

/// Jar names from `WEB-INF/lib` of a directory.
pub fn jars_in_dir(lib: &Path) -> std::io::Result<Vec<String>> {
    let mut jars: Vec<String> = fs::read_dir(lib)?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".jar"))
        .collect();
    jars.sort();
    Ok(jars)
}

/// Jar names under `WEB-INF/lib/` inside a WAR.
pub fn jars_in_war(war: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let archive = zip::ZipArchive::new(fs::File::open(war)?)?;
    let mut jars: Vec<String> = archive
        .file_names()
        .filter_map(|name| name.strip_prefix("WEB-INF/lib/"))
        .filter(|name| !name.contains('/') && name.ends_with(".jar"))
        .map(str::to_string)
        .collect();
    jars.sort();
    Ok(jars)
}

/// Configured app in webapps, else the newest WAR, else the single app in
/// webapps.
fn collect_jars(config: &Arc<AppConfig>) -> Result<(String, Vec<String>), Box<dyn std::error::Error>> {
    let deployer = Deployer::new(Arc::clone(config));
    if let Some(name) = config.project.context_name()? {
        let lib = config.tomcat.webapps_dir()?.join(&name).join("WEB-INF").join("lib");
        return Ok((name, jars_in_dir(&lib)?));
    }
    if let Ok(war) = deployer.find_artifact() {
        let label = war
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok((label, jars_in_war(&war)?));
    }
    let app = deployer.app_folder()?;
    let lib = config.tomcat.webapps_dir()?.join(&app).join("WEB-INF").join("lib");
    Ok((app, jars_in_dir(&lib)?))
}

pub async fn run(overrides: &CliOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;
    let (app, jars) = collect_jars(&config)?;

    output::section("Audit");
    output::info("app", &app);
    output::info("jars", jars.len());

    let coords: Vec<JarCoordinates> = jars.iter().filter_map(|j| parse_jar_name(j)).collect();
    let unparsed = jars.len() - coords.len();
    if unparsed > 0 {
        output::muted(&format!("  {unparsed} jar(s) without a version in the name were skipped"));
    }

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent("xavva")
        .build()?;
    let spinner = output::Spinner::start(format!("Auditing {} dependencies", coords.len()));

    let results = lookup_all(&client, OSV_QUERY_URL, coords).await?;
    spinner.clear();
    let report = AuditReport::from_results(results);

    if report.vulnerable.is_empty() {
        match report.failure_notice() {
            None => output::success(&format!("No known vulnerabilities in {} jars", report.clean)),
            Some(notice) => {
                output::warning(&notice);
                output::muted(&format!(
                    "  No known vulnerabilities in the {} jars that were checked",
                    report.clean
                ));
            }
        }
        return Ok(());
    }

    for (jar, vulns) in &report.vulnerable {
        println!();
        output::warning(&format!("{} ({} advisories)", jar.jar, vulns.len()));
        for v in vulns {
            let severity = match v.severity.to_uppercase().as_str() {
                "CRITICAL" | "HIGH" => output::brand_error(&v.severity).bold().to_string(),
                "MEDIUM" | "MODERATE" => output::brand_warning(&v.severity).to_string(),
                _ => output::brand_muted(&v.severity).to_string(),
            };
            println!("  [{severity}] {} {}", v.id, v.summary);
            if let Some(fixed) = &v.fixed_in {
                output::muted(&format!("    fixed in {fixed}"));
            }
        }
    }
    println!();
    if let Some(notice) = report.failure_notice() {
        output::warning(&notice);
    }
    output::error(&format!(
        "{} advisories across {} of {} jars",
        report.advisories(),
        report.vulnerable.len(),
        report.checked()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn parses_common_jar_names() {
        let c = parse_jar_name("jackson-databind-2.13.0.jar").unwrap();
        assert_eq!((c.artifact.as_str(), c.version.as_str()), ("jackson-databind", "2.13.0"));

        let c = parse_jar_name("log4j-1.2-api-2.17.1.jar").unwrap();
        assert_eq!((c.artifact.as_str(), c.version.as_str()), ("log4j-1.2-api", "2.17.1"));

        let c = parse_jar_name("spring-core-5.3.20-RELEASE.jar").unwrap();
        assert_eq!(c.version, "5.3.20-RELEASE");

        assert_eq!(parse_jar_name("tools.jar"), None);
        assert_eq!(parse_jar_name("servlet-api.jar"), None);
    }

    #[test]
    fn osv_response_maps_severity_summary_and_fix() {
        let body = r#"{
          "vulns": [
            {
              "id": "GHSA-1111",
              "summary": "Deserialization gadget",
              "database_specific": {"severity": "HIGH"},
              "affected": [{"ranges": [{"events": [{"introduced": "0"}, {"fixed": "2.13.4"}]}]}]
            },
            {
              "id": "CVE-2022-2",
              "details": "A critical flaw in the parser allows remote code execution when untrusted input is read by the application under default settings, affecting all users."
            }
          ]
        }"#;
        let vulns = parse_osv_response(body).unwrap();
        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[0].severity, "HIGH");
        assert_eq!(vulns[0].fixed_in.as_deref(), Some("2.13.4"));
        assert_eq!(vulns[1].severity, "CRITICAL");
        assert!(vulns[1].summary.ends_with("..."));
        assert_eq!(vulns[1].fixed_in, None);
    }

    #[test]
    fn empty_osv_response_has_no_vulns() {
        assert!(parse_osv_response("{}").unwrap().is_empty());
    }

    fn coords(name: &str) -> JarCoordinates {
        parse_jar_name(name).unwrap()
    }

    /// Serves `status` with `body` to every request.
    async fn serve(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while let Ok(n) = stream.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.ends_with(b"}") {
                        break;
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{addr}/v1/query")
    }

    #[tokio::test]
    async fn failed_lookups_are_reported_not_clean() {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let down = serve("503 Service Unavailable", "{}").await;
        let garbled = serve("200 OK", "not json").await;
        let ok = serve("200 OK", "{}").await;

        let jar = coords("jackson-databind-2.13.0.jar");
        assert!(matches!(
            query_osv(&client, &down, &jar).await,
            Err(LookupError::Status(s)) if s.as_u16() == 503
        ));
        assert!(matches!(
            query_osv(&client, &garbled, &jar).await,
            Err(LookupError::Parse(_))
        ));
        assert!(query_osv(&client, &ok, &jar).await.unwrap().is_empty());

        let results = lookup_all(&client, &down, vec![jar.clone(), coords("guava-31.0.jar")])
            .await
            .unwrap();
        let report = AuditReport::from_results(results);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.clean, 0);
        assert_eq!(
            report.failure_notice().as_deref(),
            Some("2 of 2 lookups failed; those jars were not checked")
        );
    }

    #[test]
    fn report_separates_clean_vulnerable_and_failed() {
        let vuln = Vulnerability {
            id: "GHSA-1".to_string(),
            summary: "bad".to_string(),
            severity: "HIGH".to_string(),
            fixed_in: None,
        };
        let report = AuditReport::from_results(vec![
            (coords("a-1.0.jar"), Ok(vec![])),
            (coords("b-1.0.jar"), Ok(vec![vuln.clone(), vuln])),
            (
                coords("c-1.0.jar"),
                Err(LookupError::Status(reqwest::StatusCode::BAD_GATEWAY)),
            ),
        ]);
        assert_eq!(report.clean, 1);
        assert_eq!(report.checked(), 2);
        assert_eq!(report.advisories(), 2);
        assert_eq!(report.failed[0].0.artifact, "c");

        let all_clean = AuditReport::from_results(vec![(coords("a-1.0.jar"), Ok(vec![]))]);
        assert_eq!(all_clean.failure_notice(), None);
    }

    #[test]
    fn lists_jars_from_war_and_directory() {
        let dir = TempDir::new().unwrap();
        let war = dir.path().join("shop.war");
        let mut zip = zip::ZipWriter::new(fs::File::create(&war).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for name in [
            "WEB-INF/lib/b-2.0.jar",
            "WEB-INF/lib/a-1.0.jar",
            "WEB-INF/lib/nested/c-1.0.jar",
            "WEB-INF/classes/App.class",
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(b"x").unwrap();
        }
        zip.finish().unwrap();
        assert_eq!(jars_in_war(&war).unwrap(), vec!["a-1.0.jar", "b-2.0.jar"]);

        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("z-1.jar"), b"").unwrap();
        fs::write(lib.join("readme.txt"), b"").unwrap();
        assert_eq!(jars_in_dir(&lib).unwrap(), vec!["z-1.jar"]);
    }
}
