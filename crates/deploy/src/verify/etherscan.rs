//! Etherscan-compatible verification API (BscScan and friends).

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;

use super::{Explorer, VerificationFailure, VerificationRequest};
use crate::{ArtifactStore, NetworkProfile};

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);
const STATUS_POLL_ATTEMPTS: usize = 12;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope of every Etherscan API response.
#[derive(Debug, Clone, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

/// Submits standard-json-input verification requests and polls their status.
#[derive(Debug, Clone)]
pub struct EtherscanExplorer {
    client: reqwest::Client,
    api_key: Option<String>,
    artifacts: ArtifactStore,
    poll_interval: Duration,
}

impl EtherscanExplorer {
    pub fn new(api_key: Option<String>, artifacts: ArtifactStore) -> anyhow::Result<Self> {
        Ok(Self {
            client: crate::rpc::create_client(REQUEST_TIMEOUT)?,
            api_key,
            artifacts,
            poll_interval: STATUS_POLL_INTERVAL,
        })
    }

    /// Interval between `checkverifystatus` polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn send_verification(
        &self,
        request: &VerificationRequest,
        profile: &NetworkProfile,
        api_key: &str,
    ) -> Result<String, VerificationFailure> {
        let artifact = self
            .artifacts
            .load(request.kind)
            .map_err(|e| VerificationFailure::Input(format!("{e:#}")))?;
        let build_info = artifact
            .load_build_info()
            .map_err(|e| VerificationFailure::Input(format!("{e:#}")))?;
        let encoded_args = artifact
            .encode_constructor_args(&request.constructor_args)
            .map_err(|e| VerificationFailure::Input(e.to_string()))?;

        let source_code = serde_json::to_string(&build_info.input)
            .map_err(|e| VerificationFailure::Input(e.to_string()))?;
        let chain_id = profile.chain_id.to_string();
        let address = request.address.to_string();
        let contract_name = artifact.fully_qualified_name();
        let compiler_version = format!("v{}", build_info.solc_long_version);
        let constructor_args = hex::encode(&encoded_args);

        let form = [
            ("apikey", api_key),
            ("chainid", chain_id.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source_code.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", contract_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            // Misspelling is part of the API.
            ("constructorArguements", constructor_args.as_str()),
        ];

        tracing::debug!(
            address = %request.address,
            contract = %contract_name,
            explorer = %profile.explorer_api_url,
            "Submitting verification request"
        );

        let response: EtherscanResponse = self
            .client
            .post(profile.explorer_api_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| VerificationFailure::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| VerificationFailure::Transport(e.to_string()))?;

        submission_guid(response)
    }

    async fn check_status(
        &self,
        profile: &NetworkProfile,
        api_key: &str,
        guid: &str,
    ) -> Result<(), VerificationFailure> {
        let chain_id = profile.chain_id.to_string();
        let response: EtherscanResponse = self
            .client
            .get(profile.explorer_api_url.as_str())
            .query(&[
                ("apikey", api_key),
                ("chainid", chain_id.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .map_err(|e| VerificationFailure::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| VerificationFailure::Transport(e.to_string()))?;

        verification_status(response)
    }
}

impl Explorer for EtherscanExplorer {
    async fn submit(
        &self,
        request: &VerificationRequest,
        profile: &NetworkProfile,
    ) -> Result<(), VerificationFailure> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(VerificationFailure::MissingApiKey)?;

        let guid = self.send_verification(request, profile, api_key).await?;
        tracing::info!(address = %request.address, guid = %guid, "Verification submitted, waiting for result...");

        await_verification(
            || self.check_status(profile, api_key, &guid),
            self.poll_interval,
            &guid,
        )
        .await
    }
}

/// Poll `check` while the explorer reports the submission as pending.
async fn await_verification<F, Fut>(
    check: F,
    poll_interval: Duration,
    guid: &str,
) -> Result<(), VerificationFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), VerificationFailure>>,
{
    let status = check
        .retry(
            ConstantBuilder::default()
                .with_delay(poll_interval)
                .with_max_times(STATUS_POLL_ATTEMPTS),
        )
        .when(|e| matches!(e, VerificationFailure::StillPending { .. }))
        .notify(|_, delay| {
            tracing::trace!(guid = %guid, ?delay, "Verification pending, polling again...");
        })
        .await;

    match status {
        Err(VerificationFailure::StillPending { .. }) => Err(VerificationFailure::StillPending {
            attempts: STATUS_POLL_ATTEMPTS + 1,
        }),
        other => other,
    }
}

/// The GUID of an accepted submission, or the classified rejection.
fn submission_guid(response: EtherscanResponse) -> Result<String, VerificationFailure> {
    if response.status == "1" {
        Ok(response.result)
    } else {
        Err(classify(&response.result, &response.message))
    }
}

/// Map a `checkverifystatus` response to an outcome. Pending maps to
/// `StillPending { attempts: 0 }`, the retry marker.
fn verification_status(response: EtherscanResponse) -> Result<(), VerificationFailure> {
    let result = response.result.to_lowercase();
    if result.contains("pending in queue") {
        return Err(VerificationFailure::StillPending { attempts: 0 });
    }
    if response.status == "1" {
        return Ok(());
    }
    Err(classify(&response.result, &response.message))
}

fn classify(result: &str, message: &str) -> VerificationFailure {
    let lower = result.to_lowercase();

    if lower.contains("already verified") {
        VerificationFailure::AlreadyVerified
    } else if lower.contains("rate limit") {
        VerificationFailure::RateLimited(result.to_string())
    } else if lower.contains("bytecode") || lower.contains("unable to verify") {
        VerificationFailure::CompilationMismatch(result.to_string())
    } else if result.is_empty() {
        VerificationFailure::Rejected(message.to_string())
    } else {
        VerificationFailure::Rejected(result.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use tempdir::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::{Network, plan::ArtifactKind};

    const GUID: &str = "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn";

    fn response(status: &str, result: &str) -> EtherscanResponse {
        serde_json::from_value(serde_json::json!({
            "status": status,
            "message": if status == "1" { "OK" } else { "NOTOK" },
            "result": result,
        }))
        .unwrap()
    }

    #[test]
    fn test_accepted_submission_returns_guid() {
        let guid = submission_guid(response("1", "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn"));
        assert_eq!(guid.unwrap(), "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn");
    }

    #[test]
    fn test_already_verified_submission() {
        let err = submission_guid(response("0", "Contract source code already verified")).unwrap_err();
        assert_eq!(err, VerificationFailure::AlreadyVerified);
    }

    #[test]
    fn test_rate_limited_submission() {
        let err =
            submission_guid(response("0", "Max rate limit reached, please use API Key for higher rate limit"))
                .unwrap_err();
        assert!(matches!(err, VerificationFailure::RateLimited(_)));
    }

    #[test]
    fn test_status_outcomes() {
        assert!(verification_status(response("1", "Pass - Verified")).is_ok());
        assert_eq!(
            verification_status(response("0", "Pending in queue")).unwrap_err(),
            VerificationFailure::StillPending { attempts: 0 }
        );
        assert!(matches!(
            verification_status(response("0", "Fail - Unable to verify")).unwrap_err(),
            VerificationFailure::CompilationMismatch(_)
        ));
        assert_eq!(
            verification_status(response("0", "Already Verified")).unwrap_err(),
            VerificationFailure::AlreadyVerified
        );
    }

    #[test]
    fn test_unknown_rejection_keeps_message() {
        let err = submission_guid(response("0", "Invalid API Key")).unwrap_err();
        assert_eq!(err, VerificationFailure::Rejected("Invalid API Key".to_string()));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_request() {
        let explorer = EtherscanExplorer::new(None, ArtifactStore::new("does-not-exist")).unwrap();
        let request = VerificationRequest {
            address: alloy_core::primitives::Address::ZERO,
            kind: crate::plan::ArtifactKind::Token,
            constructor_args: vec![],
        };

        let err = explorer
            .submit(&request, &crate::Network::BscTestnet.to_profile())
            .await
            .unwrap_err();
        assert_eq!(err, VerificationFailure::MissingApiKey);
    }

    #[tokio::test]
    async fn test_pending_status_retried_then_reported_with_attempt_count() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let err = await_verification(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(VerificationFailure::StillPending { attempts: 0 })
            },
            Duration::from_millis(1),
            GUID,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), STATUS_POLL_ATTEMPTS + 1);
        assert_eq!(
            err,
            VerificationFailure::StillPending {
                attempts: STATUS_POLL_ATTEMPTS + 1
            }
        );
    }

    #[tokio::test]
    async fn test_final_status_stops_polling() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let err = await_verification(
            move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(VerificationFailure::StillPending { attempts: 0 })
                } else {
                    Err(VerificationFailure::CompilationMismatch("Fail - Unable to verify".into()))
                }
            },
            Duration::from_millis(1),
            GUID,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, VerificationFailure::CompilationMismatch(_)));
    }

    /// Token artifact without constructor, plus its debug file and build-info.
    fn write_token_artifact(root: &Path) {
        let dir = root.join("contracts/Crypticorn.sol");
        std::fs::create_dir_all(&dir).unwrap();
        let artifact = serde_json::json!({
            "_format": "hh-sol-artifact-1",
            "contractName": "Crypticorn",
            "sourceName": "contracts/Crypticorn.sol",
            "abi": [],
            "bytecode": "0x6080",
            "deployedBytecode": "0x6080",
            "linkReferences": {},
            "deployedLinkReferences": {}
        });
        std::fs::write(dir.join("Crypticorn.json"), artifact.to_string()).unwrap();
        std::fs::write(
            dir.join("Crypticorn.dbg.json"),
            r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/abc.json"}"#,
        )
        .unwrap();

        let build_info_dir = root.join("build-info");
        std::fs::create_dir_all(&build_info_dir).unwrap();
        std::fs::write(
            build_info_dir.join("abc.json"),
            r#"{"id":"abc","solcVersion":"0.8.20","solcLongVersion":"0.8.20+commit.a1b79de6","input":{"language":"Solidity","sources":{}}}"#,
        )
        .unwrap();
    }

    /// Read one HTTP/1.1 request: headers up to the blank line, then `content-length` bytes.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve `bodies` in order, one per connection, recording every raw request.
    async fn serve(bodies: Vec<serde_json::Value>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v2/api", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            for body in bodies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                recorded.lock().unwrap().push(request);

                let body = body.to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });

        (url, requests)
    }

    fn explorer_for(root: &Path) -> EtherscanExplorer {
        let mut explorer = EtherscanExplorer::new(Some("key".to_string()), ArtifactStore::new(root))
            .unwrap()
            .with_poll_interval(Duration::from_millis(1));
        explorer.client = reqwest::Client::builder().no_proxy().build().unwrap();
        explorer
    }

    fn token_request() -> VerificationRequest {
        VerificationRequest {
            address: alloy_core::primitives::Address::repeat_byte(0x11),
            kind: ArtifactKind::Token,
            constructor_args: vec![],
        }
    }

    fn pending() -> serde_json::Value {
        serde_json::json!({ "status": "0", "message": "NOTOK", "result": "Pending in queue" })
    }

    #[tokio::test]
    async fn test_submission_polled_until_verified() {
        let temp_dir = TempDir::new("etherscan").unwrap();
        write_token_artifact(temp_dir.path());
        let (url, requests) = serve(vec![
            serde_json::json!({ "status": "1", "message": "OK", "result": GUID }),
            pending(),
            serde_json::json!({ "status": "1", "message": "OK", "result": "Pass - Verified" }),
        ])
        .await;

        let mut profile = Network::BscTestnet.to_profile();
        profile.explorer_api_url = url.parse().unwrap();

        explorer_for(temp_dir.path())
            .submit(&token_request(), &profile)
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);

        assert!(requests[0].starts_with("POST /v2/api"));
        assert!(requests[0].contains("action=verifysourcecode"));
        assert!(requests[0].contains("chainid=97"));
        assert!(requests[0].contains("contractname=contracts%2FCrypticorn.sol%3ACrypticorn"));

        for status_request in &requests[1..] {
            assert!(status_request.starts_with("GET /v2/api?"));
            assert!(status_request.contains("action=checkverifystatus"));
            assert!(status_request.contains("chainid=97"));
            assert!(status_request.contains(&format!("guid={GUID}")));
        }
    }

    #[tokio::test]
    async fn test_submission_left_pending_reports_attempts() {
        let temp_dir = TempDir::new("etherscan").unwrap();
        write_token_artifact(temp_dir.path());
        let mut bodies = vec![serde_json::json!({ "status": "1", "message": "OK", "result": GUID })];
        bodies.extend(std::iter::repeat_with(pending).take(STATUS_POLL_ATTEMPTS + 1));
        let (url, requests) = serve(bodies).await;

        let mut profile = Network::BscMainnet.to_profile();
        profile.explorer_api_url = url.parse().unwrap();

        let err = explorer_for(temp_dir.path())
            .submit(&token_request(), &profile)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            VerificationFailure::StillPending {
                attempts: STATUS_POLL_ATTEMPTS + 1
            }
        );
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), STATUS_POLL_ATTEMPTS + 2);
        assert!(requests.iter().all(|request| request.contains("chainid=56")));
    }
}
