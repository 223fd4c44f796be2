//! Concrete boundary-host client speaking JSON over HTTP.

use crate::{
    canvas::{
        PixelWrite,
        Region,
    },
    error::TransportError,
    protocol::{
        BoundaryConnection,
        Connector,
        Principal,
        ProbeReply,
        ProtocolVersion,
        TransferArgs,
        TransferError,
        TransferReply,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha224,
};

const SENDER_HEADER: &str = "x-sender-principal";

/// Establishes versioned HTTP connections against boundary hosts.
pub struct HttpConnector {
    http: reqwest::Client,
    ledger_service: String,
    board_service: String,
}

impl HttpConnector {
    pub fn new(
        ledger_service: impl Into<String>,
        board_service: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for boundary hosts")?;
        Ok(Self {
            http,
            ledger_service: ledger_service.into(),
            board_service: board_service.into(),
        })
    }
}

impl Connector for HttpConnector {
    type Connection = HttpConnection;

    /// Performs the liveness exchange and pins the protocol version for the
    /// lifetime of the returned connection.
    async fn connect(
        &self,
        host: &str,
        identity: Option<&Principal>,
    ) -> Result<HttpConnection, TransportError> {
        let host = host.trim_end_matches('/').to_string();
        for version in [ProtocolVersion::V2, ProtocolVersion::V1] {
            let connection = HttpConnection {
                host: host.clone(),
                version,
                identity: identity.cloned(),
                http: self.http.clone(),
                ledger_service: self.ledger_service.clone(),
                board_service: self.board_service.clone(),
            };
            match connection.probe().await {
                Ok(_) => return Ok(connection),
                Err(TransportError::Decode { .. })
                    if version == ProtocolVersion::V2 =>
                {
                    // Host predates the v2 routes; fall back once to v1.
                    continue;
                }
                Err(error) => return Err(error),
            }
        }
        Err(TransportError::Unreachable {
            host,
            message: String::from("no supported protocol version"),
        })
    }
}

/// A live, version-tagged connection to one boundary host.
pub struct HttpConnection {
    host: String,
    version: ProtocolVersion,
    identity: Option<Principal>,
    http: reqwest::Client,
    ledger_service: String,
    board_service: String,
}

impl HttpConnection {
    fn ledger_url(&self, tail: &str) -> String {
        format!(
            "{}/{}/ledger/{}/{tail}",
            self.host,
            self.version.route_prefix(),
            self.ledger_service
        )
    }

    fn board_url(&self, tail: &str) -> String {
        format!(
            "{}/{}/board/{}/{tail}",
            self.host,
            self.version.route_prefix(),
            self.board_service
        )
    }

    fn sender(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.identity {
            Some(principal) => request.header(SENDER_HEADER, principal.as_text()),
            None => request,
        }
    }

    fn transport(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                host: self.host.clone(),
            }
        } else {
            TransportError::Unreachable {
                host: self.host.clone(),
                message: error.to_string(),
            }
        }
    }

    fn decode(&self, message: impl Into<String>) -> TransportError {
        TransportError::Decode {
            host: self.host.clone(),
            message: message.into(),
        }
    }

    async fn expect_success(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable body>"));
        if status == StatusCode::NOT_FOUND {
            Err(self.decode(format!("route not found: {body}")))
        } else {
            Err(TransportError::Unreachable {
                host: self.host.clone(),
                message: format!("{status}: {body}"),
            })
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<T, TransportError> {
        let response = self
            .sender(self.http.get(url))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let response = self.expect_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| self.decode(e.to_string()))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> Result<T, TransportError> {
        let response = self
            .sender(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let response = self.expect_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| self.decode(e.to_string()))
    }
}

impl BoundaryConnection for HttpConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    async fn probe(&self) -> Result<ProbeReply, TransportError> {
        let url = format!(
            "{}/{}/status",
            self.host,
            self.version.route_prefix()
        );
        let dto: StatusDto = self.get_json(url).await?;
        Ok(dto.into())
    }

    async fn balance_of(&self, owner: &Principal) -> Result<u64, TransportError> {
        let dto: AmountDto = self
            .post_json(
                self.ledger_url("balance"),
                &BalanceQueryDto {
                    owner: owner.as_text().to_string(),
                },
            )
            .await?;
        Ok(dto.e8s)
    }

    async fn balance_of_certified(
        &self,
        owner: &Principal,
    ) -> Result<u64, TransportError> {
        let account = account_identifier(owner);
        let dto: AmountDto = self
            .get_json(self.ledger_url(&format!("accounts/{account}")))
            .await?;
        Ok(dto.e8s)
    }

    async fn transfer_fee(&self) -> Result<u64, TransportError> {
        let dto: AmountDto = self.get_json(self.ledger_url("fee")).await?;
        Ok(dto.e8s)
    }

    async fn fee_metadata(&self) -> Result<Vec<(String, String)>, TransportError> {
        self.get_json(self.ledger_url("metadata")).await
    }

    async fn transfer(
        &self,
        args: TransferArgs,
    ) -> Result<TransferReply, TransportError> {
        let dto: TransferReplyDto = self
            .post_json(self.ledger_url("transfer"), &TransferDto::from(&args))
            .await?;
        Ok(dto.into())
    }

    async fn claim_pixels(
        &self,
        indices: &[u32],
        link: Option<&str>,
    ) -> Result<(), TransportError> {
        let _: AckDto = self
            .post_json(
                self.board_url("claim"),
                &ClaimDto {
                    indices: indices.to_vec(),
                    link: link.map(String::from),
                },
            )
            .await?;
        Ok(())
    }

    async fn paint_pixels(&self, writes: &[PixelWrite]) -> Result<(), TransportError> {
        let _: AckDto = self
            .post_json(
                self.board_url("paint"),
                &PaintDto {
                    writes: writes.to_vec(),
                },
            )
            .await?;
        Ok(())
    }

    async fn read_region(&self, region: Region) -> Result<Vec<u32>, TransportError> {
        let url = self.board_url(&format!(
            "region?x0={}&y0={}&x1={}&y1={}",
            region.x0, region.y0, region.x1, region.y1
        ));
        let dto: RegionDto = self.get_json(url).await?;
        let expected = region.pixel_count() as usize;
        if dto.colors.len() != expected {
            return Err(self.decode(format!(
                "region reply has {} colors, expected {expected}",
                dto.colors.len()
            )));
        }
        Ok(dto.colors)
    }

    async fn link_at(&self, x: u32, y: u32) -> Result<Option<String>, TransportError> {
        let dto: LinkDto = self
            .get_json(self.board_url(&format!("link?x={x}&y={y}")))
            .await?;
        Ok(dto.link)
    }
}

/// Ledger account identifier for a principal: domain-separated SHA-224,
/// hex-encoded.
pub fn account_identifier(owner: &Principal) -> String {
    let mut hasher = Sha224::new();
    hasher.update(b"\x0Aaccount-id");
    hasher.update(owner.as_text().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Deserialize)]
struct StatusDto {
    version: String,
    symbol: String,
    decimals: u8,
}

impl From<StatusDto> for ProbeReply {
    fn from(dto: StatusDto) -> Self {
        let version = match dto.version.as_str() {
            "v1" => ProtocolVersion::V1,
            _ => ProtocolVersion::V2,
        };
        ProbeReply {
            version,
            ledger_symbol: dto.symbol,
            ledger_decimals: dto.decimals,
        }
    }
}

#[derive(Serialize)]
struct BalanceQueryDto {
    owner: String,
}

#[derive(Deserialize)]
struct AmountDto {
    e8s: u64,
}

#[derive(Serialize)]
struct TransferDto {
    to: String,
    amount_e8s: u64,
    fee_e8s: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at_time_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<u64>,
}

impl From<&TransferArgs> for TransferDto {
    fn from(args: &TransferArgs) -> Self {
        Self {
            to: args.to.as_text().to_string(),
            amount_e8s: args.amount_e8s,
            fee_e8s: args.fee_e8s,
            created_at_time_ns: args.created_at_time_ns,
            memo: args.memo,
        }
    }
}

#[derive(Deserialize)]
enum TransferReplyDto {
    Ok(u64),
    Err(TransferErrorDto),
}

impl From<TransferReplyDto> for TransferReply {
    fn from(dto: TransferReplyDto) -> Self {
        match dto {
            TransferReplyDto::Ok(index) => Ok(index),
            TransferReplyDto::Err(error) => Err(error.into()),
        }
    }
}

#[derive(Deserialize)]
enum TransferErrorDto {
    BadFee { expected_fee_e8s: u64 },
    CreatedInFuture,
    TooOld,
    TemporarilyUnavailable,
    InsufficientFunds { balance_e8s: u64 },
    Duplicate { duplicate_of: u64 },
    Rejected { message: String },
}

impl From<TransferErrorDto> for TransferError {
    fn from(dto: TransferErrorDto) -> Self {
        match dto {
            TransferErrorDto::BadFee { expected_fee_e8s } => {
                TransferError::BadFee { expected_fee_e8s }
            }
            TransferErrorDto::CreatedInFuture => TransferError::CreatedInFuture,
            TransferErrorDto::TooOld => TransferError::TooOld,
            TransferErrorDto::TemporarilyUnavailable => {
                TransferError::TemporarilyUnavailable
            }
            TransferErrorDto::InsufficientFunds { balance_e8s } => {
                TransferError::InsufficientFunds { balance_e8s }
            }
            TransferErrorDto::Duplicate { duplicate_of } => {
                TransferError::Duplicate { duplicate_of }
            }
            TransferErrorDto::Rejected { message } => {
                TransferError::Rejected { message }
            }
        }
    }
}

#[derive(Serialize)]
struct ClaimDto {
    indices: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<String>,
}

#[derive(Serialize)]
struct PaintDto {
    writes: Vec<PixelWrite>,
}

#[derive(Deserialize)]
struct AckDto {
    #[allow(dead_code)]
    ok: bool,
}

#[derive(Deserialize)]
struct RegionDto {
    colors: Vec<u32>,
}

#[derive(Deserialize)]
struct LinkDto {
    link: Option<String>,
}
