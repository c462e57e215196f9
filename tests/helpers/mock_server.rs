//! Mock Identity Provider for handshake tests

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use simple_sso::{PUBLIC_KEY_HEADER, SIGNATURE_HEADER, TokenSigner, sign_body};
use tokio::net::TcpListener;

/// Error simulation mode
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
	Success,
	Unauthorized,
	ServerError,
	MalformedJson,
}

/// One request as the mock saw it
#[derive(Clone)]
pub struct RecordedRequest {
	pub path: String,
	pub body: Value,
	pub public_key: Option<String>,
	pub signature_valid: bool,
	pub authorization: Option<String>,
}

struct MockState {
	public_key: String,
	private_key: String,
	error_mode: ErrorMode,
	request_token: String,
	identity: Value,
	requests: Vec<RecordedRequest>,
}

/// Mock Identity Provider
///
/// Validates the key-pair signature on every request with its own copy of
/// the keys, exactly as a real Identity Provider would, and serves the
/// request-token and verify endpoints.
pub struct MockIdentityProvider {
	state: Arc<Mutex<MockState>>,
	local_addr: SocketAddr,
}

impl MockIdentityProvider {
	/// Starts the mock on an ephemeral port
	pub async fn start(public_key: &str, private_key: &str) -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let local_addr = listener.local_addr().unwrap();

		let state = Arc::new(Mutex::new(MockState {
			public_key: public_key.to_string(),
			private_key: private_key.to_string(),
			error_mode: ErrorMode::Success,
			request_token: "test-request-token".to_string(),
			identity: json!({ "username": "testuser" }),
			requests: Vec::new(),
		}));

		let state_clone = state.clone();
		tokio::spawn(async move {
			let state = state_clone;
			loop {
				if let Ok((stream, _)) = listener.accept().await {
					let io = TokioIo::new(stream);
					let state = state.clone();

					tokio::spawn(async move {
						let mut service =
							hyper::service::service_fn(move |req: Request<Incoming>| {
								let state = state.clone();
								async move { handle_request(req, state).await }
							});

						let _ = hyper::server::conn::http1::Builder::new()
							.serve_connection(io, &mut service)
							.await;
					});
				}
			}
		});

		// Wait for the accept loop to come up
		tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

		Self { state, local_addr }
	}

	/// Base URL of the mock
	pub fn base_url(&self) -> String {
		format!("http://{}", self.local_addr)
	}

	/// Sets the error simulation mode
	pub fn set_error_mode(&self, mode: ErrorMode) {
		self.state.lock().unwrap().error_mode = mode;
	}

	/// Sets the request token handed out by the request-token endpoint
	pub fn set_request_token(&self, token: &str) {
		self.state.lock().unwrap().request_token = token.to_string();
	}

	/// Sets the identity payload returned by the verify endpoint
	pub fn set_identity(&self, identity: Value) {
		self.state.lock().unwrap().identity = identity;
	}

	/// Issues a signed access token the way the Identity Provider would
	pub fn issue_access_token(&self, value: &str) -> String {
		let private_key = self.state.lock().unwrap().private_key.clone();
		TokenSigner::new(private_key.as_bytes())
			.encode(&value.to_string())
			.unwrap()
	}

	/// All requests recorded for `path`
	pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
		self.state
			.lock()
			.unwrap()
			.requests
			.iter()
			.filter(|r| r.path == path)
			.cloned()
			.collect()
	}
}

async fn handle_request(
	req: Request<Incoming>,
	state: Arc<Mutex<MockState>>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
	let path = req.uri().path().to_string();
	let method = req.method().clone();
	let public_key = req
		.headers()
		.get(PUBLIC_KEY_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);
	let signature = req
		.headers()
		.get(SIGNATURE_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);
	let authorization = req
		.headers()
		.get(hyper::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);
	let body = req.into_body().collect().await?.to_bytes();

	let mut state = state.lock().unwrap();
	let signature_valid =
		signature.as_deref() == Some(sign_body(state.private_key.as_bytes(), &body).as_str());
	let parsed_body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
	state.requests.push(RecordedRequest {
		path: path.clone(),
		body: parsed_body,
		public_key: public_key.clone(),
		signature_valid,
		authorization,
	});

	match state.error_mode {
		ErrorMode::Unauthorized => {
			return Ok(plain_response(StatusCode::FORBIDDEN, "signature mismatch"));
		}
		ErrorMode::ServerError => {
			return Ok(plain_response(
				StatusCode::INTERNAL_SERVER_ERROR,
				"internal error",
			));
		}
		ErrorMode::MalformedJson => {
			return Ok(json_response(StatusCode::OK, "{this is not json!!!"));
		}
		ErrorMode::Success => {}
	}

	if !signature_valid || public_key.as_deref() != Some(state.public_key.as_str()) {
		return Ok(plain_response(StatusCode::FORBIDDEN, "signature mismatch"));
	}

	match (method, path.as_str()) {
		(Method::POST, "/request-token/") => {
			let body = json!({ "request_token": state.request_token }).to_string();
			Ok(json_response(StatusCode::OK, &body))
		}
		(Method::POST, "/verify/") => {
			let body = state.identity.to_string();
			Ok(json_response(StatusCode::OK, &body))
		}
		_ => Ok(plain_response(StatusCode::NOT_FOUND, "not found")),
	}
}

fn json_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
	Response::builder()
		.status(status)
		.header("Content-Type", "application/json")
		.body(Full::from(Bytes::from(body.to_string())))
		.unwrap()
}

fn plain_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
	Response::builder()
		.status(status)
		.body(Full::from(Bytes::from(body.to_string())))
		.unwrap()
}
