//! Binary wire codec for the QUIC transport
//!
//! Every frame exchanged over QUIC streams is built and parsed here. All
//! multi-byte integers are big-endian. Builders for auth, transaction submit
//! and subscription requests are total; decoders for pushed frames return
//! `None` for truncated or foreign input so a long-lived acceptor loop can
//! drop the frame and keep going.

use crate::types::{
    LatestBlockhash, LatestSlot, LeaderHint, LeaderHintMetadata, PriorityFee, StreamType,
    TipInstruction, TransactionStatus,
};

/// Frame tags (must match server)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    TransactionSubmit = 0x01,
    LeaderHints = 0x02,
    TipInstructions = 0x03,
    PriorityFees = 0x04,
    Metrics = 0x05,
    LatestBlockhash = 0x06,
    LatestSlot = 0x07,
    Ping = 0x08,
}

impl FrameTag {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FrameTag::TransactionSubmit),
            0x02 => Some(FrameTag::LeaderHints),
            0x03 => Some(FrameTag::TipInstructions),
            0x04 => Some(FrameTag::PriorityFees),
            0x05 => Some(FrameTag::Metrics),
            0x06 => Some(FrameTag::LatestBlockhash),
            0x07 => Some(FrameTag::LatestSlot),
            0x08 => Some(FrameTag::Ping),
            _ => None,
        }
    }

    /// Tag carried by frames of a subscribable stream
    pub fn for_stream(stream: StreamType) -> Self {
        match stream {
            StreamType::LeaderHints => FrameTag::LeaderHints,
            StreamType::TipInstructions => FrameTag::TipInstructions,
            StreamType::PriorityFees => FrameTag::PriorityFees,
            StreamType::LatestBlockhash => FrameTag::LatestBlockhash,
            StreamType::LatestSlot => FrameTag::LatestSlot,
        }
    }
}

/// Length of the API key prefix sent during authentication
pub const AUTH_KEY_PREFIX_LEN: usize = 8;

/// Size of a ping frame
pub const PING_FRAME_LEN: usize = 13;

/// Size of a pong frame
pub const PONG_FRAME_LEN: usize = 21;

/// Size of a raw transaction signature
pub const SIGNATURE_LEN: usize = 64;

// ============================================================================
// Cursor helpers
// ============================================================================

/// Bounds-checked big-endian cursor over a borrowed buffer
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        let b: [u8; 2] = self.take(2)?.try_into().ok()?;
        Some(u16::from_be_bytes(b))
    }

    fn u32(&mut self) -> Option<u32> {
        let b: [u8; 4] = self.take(4)?.try_into().ok()?;
        Some(u32::from_be_bytes(b))
    }

    fn u64(&mut self) -> Option<u64> {
        let b: [u8; 8] = self.take(8)?.try_into().ok()?;
        Some(u64::from_be_bytes(b))
    }

    /// `[1B len][len bytes]` decoded as lossy UTF-8
    fn short_string(&mut self) -> Option<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    fn expect_tag(&mut self, tag: FrameTag) -> Option<()> {
        (self.u8()? == tag as u8).then_some(())
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }
}

/// Append `[1B len][bytes]`, truncating to 255 bytes on a char boundary
fn put_short_string(out: &mut Vec<u8>, s: &str) {
    let mut end = s.len().min(u8::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    out.push(end as u8);
    out.extend_from_slice(&s.as_bytes()[..end]);
}

// ============================================================================
// Authentication
// ============================================================================

/// Authentication request
///
/// Wire format: `[8B key prefix][version]\0[tier\0]?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub key_prefix: [u8; AUTH_KEY_PREFIX_LEN],
    pub version: String,
    pub tier: Option<String>,
}

impl AuthRequest {
    /// Build a request from a full API key; only its first 8 bytes travel
    pub fn new(api_key: &str, version: impl Into<String>, tier: Option<String>) -> Self {
        let mut key_prefix = [0u8; AUTH_KEY_PREFIX_LEN];
        let bytes = api_key.as_bytes();
        let n = bytes.len().min(AUTH_KEY_PREFIX_LEN);
        key_prefix[..n].copy_from_slice(&bytes[..n]);
        Self {
            key_prefix,
            version: version.into(),
            tier: tier.filter(|t| !t.is_empty()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let tier_len = self.tier.as_ref().map_or(0, |t| t.len() + 1);
        let mut out = Vec::with_capacity(AUTH_KEY_PREFIX_LEN + self.version.len() + 1 + tier_len);
        out.extend_from_slice(&self.key_prefix);
        out.extend_from_slice(self.version.as_bytes());
        out.push(0);
        if let Some(ref tier) = self.tier {
            out.extend_from_slice(tier.as_bytes());
            out.push(0);
        }
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        let key_prefix: [u8; AUTH_KEY_PREFIX_LEN] = r.take(AUTH_KEY_PREFIX_LEN)?.try_into().ok()?;
        let mut parts = r.rest().split(|&b| b == 0);
        let version = String::from_utf8_lossy(parts.next().unwrap_or_default()).into_owned();
        let tier = parts
            .next()
            .filter(|t| !t.is_empty())
            .map(|t| String::from_utf8_lossy(t).into_owned());
        Some(Self {
            key_prefix,
            version,
            tier,
        })
    }
}

/// Authentication response
///
/// Wire format: `[1B status (1 = success)][UTF-8 message]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

impl AuthResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.message.len());
        out.push(u8::from(self.success));
        out.extend_from_slice(self.message.as_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let (&status, message) = data.split_first()?;
        Some(Self {
            success: status == 0x01,
            message: String::from_utf8_lossy(message).into_owned(),
        })
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Build a transaction submit frame: `[0x01][raw transaction bytes]`
pub fn encode_transaction_submit(transaction: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + transaction.len());
    frame.push(FrameTag::TransactionSubmit as u8);
    frame.extend_from_slice(transaction);
    frame
}

/// Parse a transaction submit frame back into the raw transaction
pub fn decode_transaction_submit(data: &[u8]) -> Option<&[u8]> {
    match data.split_first() {
        Some((&tag, tx)) if tag == FrameTag::TransactionSubmit as u8 => Some(tx),
        _ => None,
    }
}

/// Transaction response status codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Accepted = 0x01,
    Duplicate = 0x02,
    RateLimited = 0x03,
    ServerError = 0x04,
}

impl ResponseStatus {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ResponseStatus::Accepted),
            0x02 => Some(ResponseStatus::Duplicate),
            0x03 => Some(ResponseStatus::RateLimited),
            0x04 => Some(ResponseStatus::ServerError),
            _ => None,
        }
    }

    pub fn transaction_status(self) -> TransactionStatus {
        match self {
            ResponseStatus::Accepted => TransactionStatus::Sent,
            ResponseStatus::Duplicate => TransactionStatus::Duplicate,
            ResponseStatus::RateLimited => TransactionStatus::RateLimited,
            ResponseStatus::ServerError => TransactionStatus::Failed,
        }
    }
}

/// Response to a transaction submit
///
/// Wire format:
/// - 4 bytes: request_id (u32 BE)
/// - 1 byte: status
/// - 1 byte: has_signature
/// - 64 bytes: signature (if has_signature)
/// - 2 bytes: error_len (u16 BE)
/// - N bytes: error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub request_id: u32,
    pub status: u8,
    pub signature: Option<[u8; SIGNATURE_LEN]>,
    pub error_message: String,
}

impl TransactionResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + SIGNATURE_LEN + self.error_message.len());
        out.extend_from_slice(&self.request_id.to_be_bytes());
        out.push(self.status);
        match self.signature {
            Some(ref sig) => {
                out.push(1);
                out.extend_from_slice(sig);
            }
            None => out.push(0),
        }
        let err = self.error_message.as_bytes();
        let err = &err[..err.len().min(u16::MAX as usize)];
        out.extend_from_slice(&(err.len() as u16).to_be_bytes());
        out.extend_from_slice(err);
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        let request_id = r.u32()?;
        let status = r.u8()?;
        let signature = match r.u8()? {
            0 => None,
            _ => {
                let sig: [u8; SIGNATURE_LEN] = r.take(SIGNATURE_LEN)?.try_into().ok()?;
                Some(sig)
            }
        };
        let err_len = r.u16()? as usize;
        let error_message = String::from_utf8_lossy(r.take(err_len)?).into_owned();
        Some(Self {
            request_id,
            status,
            signature,
            error_message,
        })
    }

    pub fn response_status(&self) -> Option<ResponseStatus> {
        ResponseStatus::from_byte(self.status)
    }

    /// Signature in its canonical base58 text form
    pub fn signature_base58(&self) -> Option<String> {
        self.signature.as_ref().map(|s| encode_base58(s))
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Build a subscription request: `[1B stream tag]`
pub fn encode_subscription_request(stream: StreamType) -> [u8; 1] {
    [FrameTag::for_stream(stream) as u8]
}

/// Parse a subscription request
pub fn decode_subscription_request(data: &[u8]) -> Option<StreamType> {
    let tag = FrameTag::from_byte(*data.first()?)?;
    StreamType::ALL
        .into_iter()
        .find(|s| FrameTag::for_stream(*s) == tag)
}

// ============================================================================
// Pushed stream frames
// ============================================================================

/// Leader hint frame
///
/// Wire format:
/// - 1 byte: tag (0x02)
/// - 1 byte: region length, N bytes: region
/// - 2 bytes: confidence * 100 (u16 BE)
/// - 4 bytes: slots remaining (u32 BE)
/// - 1 byte: leader pubkey length, N bytes: leader pubkey
/// - 8 bytes: timestamp (u64 BE)
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderHintFrame {
    pub region: String,
    /// 0.0 to 100.0, two decimals of precision on the wire
    pub confidence: f64,
    pub slots_remaining: u32,
    pub leader_pubkey: String,
    pub timestamp: u64,
}

impl LeaderHintFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            17 + self.region.len().min(255) + self.leader_pubkey.len().min(255),
        );
        out.push(FrameTag::LeaderHints as u8);
        put_short_string(&mut out, &self.region);
        let scaled = (self.confidence.clamp(0.0, 100.0) * 100.0).round() as u16;
        out.extend_from_slice(&scaled.to_be_bytes());
        out.extend_from_slice(&self.slots_remaining.to_be_bytes());
        put_short_string(&mut out, &self.leader_pubkey);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        r.expect_tag(FrameTag::LeaderHints)?;
        Some(Self {
            region: r.short_string()?,
            confidence: f64::from(r.u16()?) / 100.0,
            slots_remaining: r.u32()?,
            leader_pubkey: r.short_string()?,
            timestamp: r.u64()?,
        })
    }
}

impl From<LeaderHintFrame> for LeaderHint {
    fn from(frame: LeaderHintFrame) -> Self {
        let confidence = frame.confidence.round().clamp(0.0, 100.0) as u32;
        LeaderHint {
            timestamp: frame.timestamp,
            slot: 0,
            expires_at_slot: u64::from(frame.slots_remaining),
            preferred_region: frame.region,
            backup_regions: Vec::new(),
            confidence,
            leader_pubkey: Some(frame.leader_pubkey).filter(|k| !k.is_empty()),
            metadata: LeaderHintMetadata {
                tpu_rtt_ms: 0,
                region_score: frame.confidence / 100.0,
            },
        }
    }
}

/// Tip instruction frame
///
/// Wire format:
/// - 1 byte: tag (0x03)
/// - 1 byte: sender length, N bytes: sender
/// - 1 byte: wallet length, N bytes: wallet
/// - 8 bytes: tip amount in lamports (u64 BE)
/// - 1 byte: tier length, N bytes: tier
/// - 4 bytes: expected latency ms (u32 BE)
/// - 8 bytes: timestamp (u64 BE)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipInstructionFrame {
    pub sender: String,
    pub wallet: String,
    pub amount_lamports: u64,
    pub tier: String,
    pub latency_ms: u32,
    pub timestamp: u64,
}

impl TipInstructionFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.sender.len() + self.wallet.len() + self.tier.len());
        out.push(FrameTag::TipInstructions as u8);
        put_short_string(&mut out, &self.sender);
        put_short_string(&mut out, &self.wallet);
        out.extend_from_slice(&self.amount_lamports.to_be_bytes());
        put_short_string(&mut out, &self.tier);
        out.extend_from_slice(&self.latency_ms.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        r.expect_tag(FrameTag::TipInstructions)?;
        Some(Self {
            sender: r.short_string()?,
            wallet: r.short_string()?,
            amount_lamports: r.u64()?,
            tier: r.short_string()?,
            latency_ms: r.u32()?,
            timestamp: r.u64()?,
        })
    }
}

impl From<TipInstructionFrame> for TipInstruction {
    fn from(frame: TipInstructionFrame) -> Self {
        TipInstruction {
            timestamp: frame.timestamp,
            sender_name: frame.sender.clone(),
            sender: frame.sender,
            tip_wallet_address: frame.wallet,
            tip_amount_lamports: frame.amount_lamports,
            tip_tier: frame.tier,
            expected_latency_ms: frame.latency_ms,
            confidence: 0,
            valid_until_slot: 0,
            alternative_senders: Vec::new(),
        }
    }
}

/// Priority fee frame
///
/// Wire format: `[0x04][8B micro-lamports per CU][1B percentile][4B sample count][8B timestamp]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityFeeFrame {
    pub micro_lamports_per_cu: u64,
    pub percentile: u8,
    pub sample_count: u32,
    pub timestamp: u64,
}

/// Compute unit limit assumed when the feed only carries a price
const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 200_000;

impl PriorityFeeFrame {
    pub const LEN: usize = 22;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(FrameTag::PriorityFees as u8);
        out.extend_from_slice(&self.micro_lamports_per_cu.to_be_bytes());
        out.push(self.percentile);
        out.extend_from_slice(&self.sample_count.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        r.expect_tag(FrameTag::PriorityFees)?;
        Some(Self {
            micro_lamports_per_cu: r.u64()?,
            percentile: r.u8()?,
            sample_count: r.u32()?,
            timestamp: r.u64()?,
        })
    }
}

impl From<PriorityFeeFrame> for PriorityFee {
    fn from(frame: PriorityFeeFrame) -> Self {
        let speed = match frame.percentile {
            0..=50 => "low",
            51..=75 => "medium",
            _ => "high",
        };
        let landing_probability = match frame.percentile {
            0..=25 => 50,
            26..=50 => 70,
            51..=75 => 85,
            76..=90 => 95,
            _ => 99,
        };
        let network_congestion = match frame.micro_lamports_per_cu {
            p if p > 100_000 => "high",
            p if p > 10_000 => "medium",
            _ => "low",
        };
        PriorityFee {
            timestamp: frame.timestamp,
            speed: speed.to_string(),
            compute_unit_price: frame.micro_lamports_per_cu,
            compute_unit_limit: DEFAULT_COMPUTE_UNIT_LIMIT,
            percentile: frame.percentile,
            sample_count: frame.sample_count,
            landing_probability,
            network_congestion: network_congestion.to_string(),
        }
    }
}

/// Latest blockhash frame
///
/// Wire format: `[0x06][1B hash len][hash][8B last valid block height][8B timestamp]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestBlockhashFrame {
    pub blockhash: String,
    pub last_valid_block_height: u64,
    pub timestamp: u64,
}

impl LatestBlockhashFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18 + self.blockhash.len());
        out.push(FrameTag::LatestBlockhash as u8);
        put_short_string(&mut out, &self.blockhash);
        out.extend_from_slice(&self.last_valid_block_height.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        r.expect_tag(FrameTag::LatestBlockhash)?;
        Some(Self {
            blockhash: r.short_string()?,
            last_valid_block_height: r.u64()?,
            timestamp: r.u64()?,
        })
    }
}

impl From<LatestBlockhashFrame> for LatestBlockhash {
    fn from(frame: LatestBlockhashFrame) -> Self {
        LatestBlockhash {
            blockhash: frame.blockhash,
            last_valid_block_height: frame.last_valid_block_height,
            timestamp: frame.timestamp,
        }
    }
}

/// Latest slot frame
///
/// Wire format: `[0x07][8B slot][8B timestamp]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestSlotFrame {
    pub slot: u64,
    pub timestamp: u64,
}

impl LatestSlotFrame {
    pub const LEN: usize = 17;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(FrameTag::LatestSlot as u8);
        out.extend_from_slice(&self.slot.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        r.expect_tag(FrameTag::LatestSlot)?;
        Some(Self {
            slot: r.u64()?,
            timestamp: r.u64()?,
        })
    }
}

impl From<LatestSlotFrame> for LatestSlot {
    fn from(frame: LatestSlotFrame) -> Self {
        LatestSlot {
            slot: frame.slot,
            timestamp: frame.timestamp,
        }
    }
}

/// Any frame the server pushes on a subscription stream
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    LeaderHint(LeaderHintFrame),
    TipInstruction(TipInstructionFrame),
    PriorityFee(PriorityFeeFrame),
    LatestBlockhash(LatestBlockhashFrame),
    LatestSlot(LatestSlotFrame),
}

impl PushFrame {
    pub fn stream_type(&self) -> StreamType {
        match self {
            PushFrame::LeaderHint(_) => StreamType::LeaderHints,
            PushFrame::TipInstruction(_) => StreamType::TipInstructions,
            PushFrame::PriorityFee(_) => StreamType::PriorityFees,
            PushFrame::LatestBlockhash(_) => StreamType::LatestBlockhash,
            PushFrame::LatestSlot(_) => StreamType::LatestSlot,
        }
    }
}

/// Decode a pushed frame by inspecting its tag byte.
///
/// Metrics frames, unknown tags and malformed payloads all yield `None`.
pub fn decode_push_frame(data: &[u8]) -> Option<PushFrame> {
    match FrameTag::from_byte(*data.first()?)? {
        FrameTag::LeaderHints => LeaderHintFrame::decode(data).map(PushFrame::LeaderHint),
        FrameTag::TipInstructions => TipInstructionFrame::decode(data).map(PushFrame::TipInstruction),
        FrameTag::PriorityFees => PriorityFeeFrame::decode(data).map(PushFrame::PriorityFee),
        FrameTag::LatestBlockhash => {
            LatestBlockhashFrame::decode(data).map(PushFrame::LatestBlockhash)
        }
        FrameTag::LatestSlot => LatestSlotFrame::decode(data).map(PushFrame::LatestSlot),
        FrameTag::TransactionSubmit | FrameTag::Metrics | FrameTag::Ping => None,
    }
}

// ============================================================================
// Ping / pong
// ============================================================================

/// Ping frame: `[0x08][4B seq][8B client send time]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub seq: u32,
    pub client_send_time: u64,
}

impl PingFrame {
    pub fn encode(&self) -> [u8; PING_FRAME_LEN] {
        let mut frame = [0u8; PING_FRAME_LEN];
        frame[0] = FrameTag::Ping as u8;
        frame[1..5].copy_from_slice(&self.seq.to_be_bytes());
        frame[5..13].copy_from_slice(&self.client_send_time.to_be_bytes());
        frame
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        r.expect_tag(FrameTag::Ping)?;
        Some(Self {
            seq: r.u32()?,
            client_send_time: r.u64()?,
        })
    }
}

/// Pong frame: `[0x08][4B seq][8B client send time][8B server time]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongFrame {
    pub seq: u32,
    pub client_send_time: u64,
    pub server_time: u64,
}

impl PongFrame {
    pub fn encode(&self) -> [u8; PONG_FRAME_LEN] {
        let mut frame = [0u8; PONG_FRAME_LEN];
        frame[0] = FrameTag::Ping as u8;
        frame[1..5].copy_from_slice(&self.seq.to_be_bytes());
        frame[5..13].copy_from_slice(&self.client_send_time.to_be_bytes());
        frame[13..21].copy_from_slice(&self.server_time.to_be_bytes());
        frame
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let mut r = Reader::new(data);
        r.expect_tag(FrameTag::Ping)?;
        Some(Self {
            seq: r.u32()?,
            client_send_time: r.u64()?,
            server_time: r.u64()?,
        })
    }
}

// ============================================================================
// Base58
// ============================================================================

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Encode bytes as base58, one leading '1' per leading zero byte
pub fn encode_base58(input: &[u8]) -> String {
    let zeros = input.iter().take_while(|&&b| b == 0).count();

    // little-endian base-58 digits
    let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 138 / 100 + 1);
    for &byte in &input[zeros..] {
        let mut carry = u32::from(byte);
        for digit in digits.iter_mut() {
            carry += u32::from(*digit) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(digits.iter().rev().map(|&d| BASE58_ALPHABET[d as usize] as char));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint_frame() -> LeaderHintFrame {
        LeaderHintFrame {
            region: "us-east".to_string(),
            confidence: 87.5,
            slots_remaining: 4,
            leader_pubkey: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string(),
            timestamp: 1_706_011_200_000,
        }
    }

    #[test]
    fn test_frame_tag_values() {
        assert_eq!(FrameTag::TransactionSubmit as u8, 0x01);
        assert_eq!(FrameTag::LeaderHints as u8, 0x02);
        assert_eq!(FrameTag::TipInstructions as u8, 0x03);
        assert_eq!(FrameTag::PriorityFees as u8, 0x04);
        assert_eq!(FrameTag::Metrics as u8, 0x05);
        assert_eq!(FrameTag::LatestBlockhash as u8, 0x06);
        assert_eq!(FrameTag::LatestSlot as u8, 0x07);
        assert_eq!(FrameTag::Ping as u8, 0x08);
        assert_eq!(FrameTag::from_byte(0x09), None);
    }

    #[test]
    fn test_auth_request_layout() {
        let req = AuthRequest::new("sk_live_MPn7cQvz", "rust-sdk-v0.2.0", Some("pro".into()));
        let bytes = req.encode();
        assert_eq!(&bytes[..8], b"sk_live_");
        assert_eq!(&bytes[8..], b"rust-sdk-v0.2.0\0pro\0");
        assert_eq!(AuthRequest::decode(&bytes), Some(req));
    }

    #[test]
    fn test_auth_request_short_key_is_zero_padded() {
        let req = AuthRequest::new("sk_1", "v", None);
        let bytes = req.encode();
        assert_eq!(&bytes[..8], b"sk_1\0\0\0\0");
        assert_eq!(&bytes[8..], b"v\0");
        assert_eq!(AuthRequest::decode(&bytes), Some(req));
    }

    #[test]
    fn test_auth_response() {
        let ok = AuthResponse::decode(b"\x01ok:session-42").unwrap();
        assert!(ok.success);
        assert_eq!(ok.message, "ok:session-42");

        let denied = AuthResponse::decode(b"\x00invalid key").unwrap();
        assert!(!denied.success);
        assert_eq!(AuthResponse::decode(&denied.encode()), Some(denied));

        assert_eq!(AuthResponse::decode(&[]), None);
    }

    #[test]
    fn test_transaction_submit_frame() {
        let frame = encode_transaction_submit(&[0xde, 0xad]);
        assert_eq!(frame, vec![0x01, 0xde, 0xad]);
        assert_eq!(decode_transaction_submit(&frame), Some(&[0xde, 0xad][..]));
        assert_eq!(decode_transaction_submit(&[0x02, 0xde]), None);
    }

    #[test]
    fn test_transaction_response_with_signature() {
        let mut sig = [7u8; SIGNATURE_LEN];
        sig[0] = 0;
        let resp = TransactionResponse {
            request_id: 42,
            status: ResponseStatus::Accepted as u8,
            signature: Some(sig),
            error_message: String::new(),
        };
        let bytes = resp.encode();
        assert_eq!(bytes.len(), 4 + 1 + 1 + 64 + 2);
        let decoded = TransactionResponse::decode(&bytes).unwrap();
        assert_eq!(decoded, resp);
        assert_eq!(decoded.response_status(), Some(ResponseStatus::Accepted));
        assert!(decoded.signature_base58().unwrap().starts_with('1'));
    }

    #[test]
    fn test_transaction_response_error_only() {
        let resp = TransactionResponse {
            request_id: 7,
            status: ResponseStatus::RateLimited as u8,
            signature: None,
            error_message: "slow down".to_string(),
        };
        let decoded = TransactionResponse::decode(&resp.encode()).unwrap();
        assert_eq!(decoded.error_message, "slow down");
        assert_eq!(
            decoded.response_status().map(ResponseStatus::transaction_status),
            Some(TransactionStatus::RateLimited)
        );
    }

    #[test]
    fn test_transaction_response_truncated() {
        let resp = TransactionResponse {
            request_id: 1,
            status: 1,
            signature: Some([1u8; SIGNATURE_LEN]),
            error_message: "x".to_string(),
        };
        let bytes = resp.encode();
        for len in 0..bytes.len() {
            assert!(TransactionResponse::decode(&bytes[..len]).is_none(), "len {}", len);
        }
    }

    #[test]
    fn test_subscription_request() {
        assert_eq!(encode_subscription_request(StreamType::LeaderHints), [0x02]);
        assert_eq!(encode_subscription_request(StreamType::LatestSlot), [0x07]);
        for stream in StreamType::ALL {
            let bytes = encode_subscription_request(stream);
            assert_eq!(decode_subscription_request(&bytes), Some(stream));
        }
        assert_eq!(decode_subscription_request(&[0x05]), None);
    }

    #[test]
    fn test_leader_hint_round_trip() {
        let frame = hint_frame();
        assert_eq!(LeaderHintFrame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn test_leader_hint_empty_strings_and_zero_confidence() {
        let frame = LeaderHintFrame {
            region: String::new(),
            confidence: 0.0,
            slots_remaining: 0,
            leader_pubkey: String::new(),
            timestamp: 0,
        };
        assert_eq!(LeaderHintFrame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn test_leader_hint_confidence_scaling() {
        let mut frame = hint_frame();
        frame.confidence = 87.5;
        let bytes = frame.encode();
        let conf_offset = 2 + frame.region.len();
        assert_eq!(&bytes[conf_offset..conf_offset + 2], &8750u16.to_be_bytes());

        frame.confidence = 250.0;
        let decoded = LeaderHintFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.confidence, 100.0);
    }

    #[test]
    fn test_leader_hint_into_domain() {
        let hint: LeaderHint = hint_frame().into();
        assert_eq!(hint.preferred_region, "us-east");
        assert_eq!(hint.confidence, 88);
        assert_eq!(hint.slots_remaining(), 4);
        assert_eq!(hint.valid_for_ms(), 1600);
        assert!(hint.leader_pubkey.is_some());

        let mut frame = hint_frame();
        frame.leader_pubkey.clear();
        let hint: LeaderHint = frame.into();
        assert_eq!(hint.leader_pubkey, None);
    }

    #[test]
    fn test_long_strings_are_truncated() {
        let mut frame = hint_frame();
        frame.region = "r".repeat(300);
        let decoded = LeaderHintFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.region.len(), 255);
    }

    #[test]
    fn test_tip_instruction_round_trip() {
        let frame = TipInstructionFrame {
            sender: "0slot".to_string(),
            wallet: "Tip1111111111111111111111111111111111111111".to_string(),
            amount_lamports: 1_000_000,
            tier: "fast".to_string(),
            latency_ms: 120,
            timestamp: 1_706_011_200_000,
        };
        assert_eq!(TipInstructionFrame::decode(&frame.encode()), Some(frame.clone()));

        let tip: TipInstruction = frame.into();
        assert_eq!(tip.tip_amount_lamports, 1_000_000);
        assert!((tip.tip_amount_sol() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_priority_fee_round_trip() {
        let frame = PriorityFeeFrame {
            micro_lamports_per_cu: 50_000,
            percentile: 75,
            sample_count: 150,
            timestamp: 99,
        };
        let bytes = frame.encode();
        assert_eq!(bytes.len(), PriorityFeeFrame::LEN);
        assert_eq!(PriorityFeeFrame::decode(&bytes), Some(frame.clone()));

        let fee: PriorityFee = frame.into();
        assert_eq!(fee.speed, "medium");
        assert_eq!(fee.network_congestion, "medium");
        assert_eq!(fee.landing_probability, 85);
    }

    #[test]
    fn test_latest_blockhash_and_slot_round_trip() {
        let hash = LatestBlockhashFrame {
            blockhash: "GHtXQBsoZHVnNFa9YevAzFr17DJjgHXk3ycTKD5xD3Zi".to_string(),
            last_valid_block_height: 250_000_000,
            timestamp: 12,
        };
        assert_eq!(LatestBlockhashFrame::decode(&hash.encode()), Some(hash));

        let slot = LatestSlotFrame {
            slot: 280_000_000,
            timestamp: 13,
        };
        let bytes = slot.encode();
        assert_eq!(bytes.len(), LatestSlotFrame::LEN);
        assert_eq!(LatestSlotFrame::decode(&bytes), Some(slot));
    }

    #[test]
    fn test_push_frame_dispatch() {
        let frame = decode_push_frame(&hint_frame().encode()).unwrap();
        assert_eq!(frame.stream_type(), StreamType::LeaderHints);

        let slot = LatestSlotFrame { slot: 1, timestamp: 2 }.encode();
        assert!(matches!(decode_push_frame(&slot), Some(PushFrame::LatestSlot(_))));

        assert_eq!(decode_push_frame(&[0x05, 1, 2, 3]), None);
        assert_eq!(decode_push_frame(&[0xff, 1, 2, 3]), None);
        assert_eq!(decode_push_frame(&[]), None);
    }

    #[test]
    fn test_truncated_push_frames_are_rejected() {
        let frames = vec![
            hint_frame().encode(),
            TipInstructionFrame {
                sender: "s".into(),
                wallet: "w".into(),
                amount_lamports: 1,
                tier: "t".into(),
                latency_ms: 1,
                timestamp: 1,
            }
            .encode(),
            PriorityFeeFrame {
                micro_lamports_per_cu: 1,
                percentile: 1,
                sample_count: 1,
                timestamp: 1,
            }
            .encode(),
            LatestBlockhashFrame {
                blockhash: "h".into(),
                last_valid_block_height: 1,
                timestamp: 1,
            }
            .encode(),
            LatestSlotFrame { slot: 1, timestamp: 1 }.encode(),
        ];

        for bytes in frames {
            assert!(decode_push_frame(&bytes).is_some());
            for len in 0..bytes.len() {
                assert!(decode_push_frame(&bytes[..len]).is_none());
            }
        }
    }

    #[test]
    fn test_garbage_never_panics() {
        let garbage: Vec<Vec<u8>> = vec![
            vec![0x02, 0xff],
            vec![0x03, 0xff, 0xff, 0xff],
            vec![0x06, 200, 1, 2],
            vec![0x08],
            (0..=255u8).collect(),
            (0..=255u8).rev().collect(),
        ];
        for bytes in garbage {
            let _ = decode_push_frame(&bytes);
            let _ = PongFrame::decode(&bytes);
            let _ = TransactionResponse::decode(&bytes);
            let _ = AuthRequest::decode(&bytes);
        }
    }

    #[test]
    fn test_ping_pong() {
        let ping = PingFrame {
            seq: 3,
            client_send_time: 1_000,
        };
        let bytes = ping.encode();
        assert_eq!(bytes.len(), PING_FRAME_LEN);
        assert_eq!(PingFrame::decode(&bytes), Some(ping));

        let pong = PongFrame {
            seq: 3,
            client_send_time: 1_000,
            server_time: 1_250,
        };
        let bytes = pong.encode();
        assert_eq!(bytes.len(), PONG_FRAME_LEN);
        assert_eq!(PongFrame::decode(&bytes), Some(pong));
        assert_eq!(PongFrame::decode(&bytes[..20]), None);
    }

    #[test]
    fn test_base58_matches_reference() {
        let samples: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0, 0, 1],
            vec![0xff; 32],
            (0..64u8).collect(),
            {
                let mut v = vec![0u8; 3];
                v.extend_from_slice(&[9u8; 61]);
                v
            },
        ];
        for bytes in samples {
            assert_eq!(encode_base58(&bytes), bs58::encode(&bytes).into_string());
        }
        assert_eq!(encode_base58(b"hello world"), "StV1DL6CwTryKyV");
    }
}
