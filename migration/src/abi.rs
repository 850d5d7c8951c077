// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Typed bindings for the CurrencyNetwork / CurrencyNetworkOwnable ABI.
//!
//! Event and call signatures are pinned with explicit `abi = "…"`
//! attributes so topic hashes and selectors match the deployed contracts
//! exactly (int72/uint32 would otherwise be widened by the derive's
//! type-based inference). Events carry the `_`-prefixed field names of the
//! Solidity schema; the fold in `event_index` dispatches on the tagged
//! [`NetworkEvent`] enum exhaustively.

use ethers::abi::RawLog;
use ethers::contract::{EthAbiCodec, EthAbiType, EthCall, EthDisplay, EthEvent, EthLogDecode};
use ethers::types::Address;

// ---------------------------------------------------------------------------
// Events emitted by the source network
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "TrustlineUpdate",
    abi = "TrustlineUpdate(address,address,uint64,uint64,int16,int16,bool)"
)]
pub struct TrustlineUpdateFilter {
    #[ethevent(indexed)]
    pub creditor: Address,
    #[ethevent(indexed)]
    pub debtor: Address,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "TrustlineUpdateRequest",
    abi = "TrustlineUpdateRequest(address,address,uint64,uint64,int16,int16,bool)"
)]
pub struct TrustlineUpdateRequestFilter {
    #[ethevent(indexed)]
    pub creditor: Address,
    #[ethevent(indexed)]
    pub debtor: Address,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
}

/// Schema v2 variant of the update request, carrying the transfer that is
/// executed when the counterparty accepts.
#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "TrustlineUpdateRequest",
    abi = "TrustlineUpdateRequest(address,address,uint64,uint64,int16,int16,bool,int64)"
)]
pub struct TrustlineUpdateRequestV2Filter {
    #[ethevent(indexed)]
    pub creditor: Address,
    #[ethevent(indexed)]
    pub debtor: Address,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
    pub transfer: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "TrustlineUpdateCancel",
    abi = "TrustlineUpdateCancel(address,address)"
)]
pub struct TrustlineUpdateCancelFilter {
    #[ethevent(indexed)]
    pub initiator: Address,
    #[ethevent(indexed)]
    pub counterparty: Address,
}

/// Balance as seen from `from` after a balance-affecting operation. The
/// from→to direction is significant: the value is what `to` owes `from`.
#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "BalanceUpdate", abi = "BalanceUpdate(address,address,int72)")]
pub struct BalanceUpdateFilter {
    #[ethevent(indexed)]
    pub from: Address,
    #[ethevent(indexed)]
    pub to: Address,
    pub value: i128,
}

/// `new_debt` is the absolute new debt of `debtor` towards `creditor`.
#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "DebtUpdate", abi = "DebtUpdate(address,address,int72)")]
pub struct DebtUpdateFilter {
    pub debtor: Address,
    pub creditor: Address,
    pub new_debt: i128,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "Onboard", abi = "Onboard(address,address)")]
pub struct OnboardFilter {
    #[ethevent(indexed)]
    pub onboarder: Address,
    #[ethevent(indexed)]
    pub onboardee: Address,
}

/// All events the migration consumes, as a tagged variant. Anything else in
/// a currency-network log stream is simply not decodable into this enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkEvent {
    TrustlineUpdate(TrustlineUpdateFilter),
    TrustlineUpdateRequest(TrustlineUpdateRequestFilter),
    TrustlineUpdateRequestV2(TrustlineUpdateRequestV2Filter),
    TrustlineUpdateCancel(TrustlineUpdateCancelFilter),
    BalanceUpdate(BalanceUpdateFilter),
    DebtUpdate(DebtUpdateFilter),
    Onboard(OnboardFilter),
}

impl NetworkEvent {
    /// Decode a raw log into a network event. Returns `None` for events
    /// outside the migration's schema (signature hash decides; the v1 and
    /// v2 request events have distinct topics).
    pub fn try_decode(raw: &RawLog) -> Option<Self> {
        if let Ok(decoded) = <TrustlineUpdateFilter as EthLogDecode>::decode_log(raw) {
            return Some(NetworkEvent::TrustlineUpdate(decoded));
        }
        if let Ok(decoded) = <TrustlineUpdateRequestFilter as EthLogDecode>::decode_log(raw) {
            return Some(NetworkEvent::TrustlineUpdateRequest(decoded));
        }
        if let Ok(decoded) = <TrustlineUpdateRequestV2Filter as EthLogDecode>::decode_log(raw) {
            return Some(NetworkEvent::TrustlineUpdateRequestV2(decoded));
        }
        if let Ok(decoded) = <TrustlineUpdateCancelFilter as EthLogDecode>::decode_log(raw) {
            return Some(NetworkEvent::TrustlineUpdateCancel(decoded));
        }
        if let Ok(decoded) = <BalanceUpdateFilter as EthLogDecode>::decode_log(raw) {
            return Some(NetworkEvent::BalanceUpdate(decoded));
        }
        if let Ok(decoded) = <DebtUpdateFilter as EthLogDecode>::decode_log(raw) {
            return Some(NetworkEvent::DebtUpdate(decoded));
        }
        if let Ok(decoded) = <OnboardFilter as EthLogDecode>::decode_log(raw) {
            return Some(NetworkEvent::Onboard(decoded));
        }
        None
    }

    pub fn name(&self) -> &'static str {
        match self {
            NetworkEvent::TrustlineUpdate(_) => "TrustlineUpdate",
            NetworkEvent::TrustlineUpdateRequest(_) => "TrustlineUpdateRequest",
            NetworkEvent::TrustlineUpdateRequestV2(_) => "TrustlineUpdateRequest",
            NetworkEvent::TrustlineUpdateCancel(_) => "TrustlineUpdateCancel",
            NetworkEvent::BalanceUpdate(_) => "BalanceUpdate",
            NetworkEvent::DebtUpdate(_) => "DebtUpdate",
            NetworkEvent::Onboard(_) => "Onboard",
        }
    }
}

// ---------------------------------------------------------------------------
// Owner-only state setters on the destination network
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(
    name = "setAccount",
    abi = "setAccount(address,address,uint64,uint64,int16,int16,bool,uint32,int72)"
)]
pub struct SetAccountCall {
    pub creditor: Address,
    pub debtor: Address,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
    pub mtime: u32,
    pub balance: i128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "setOnboarder", abi = "setOnboarder(address,address)")]
pub struct SetOnboarderCall {
    pub user: Address,
    pub on_boarder: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "setDebt", abi = "setDebt(address,address,int72)")]
pub struct SetDebtCall {
    pub debtor: Address,
    pub creditor: Address,
    pub value: i128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(
    name = "setTrustlineRequest",
    abi = "setTrustlineRequest(address,address,uint64,uint64,int16,int16,bool)"
)]
pub struct SetTrustlineRequestCall {
    pub creditor: Address,
    pub debtor: Address,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(
    name = "setTrustlineRequest",
    abi = "setTrustlineRequest(address,address,uint64,uint64,int16,int16,bool,int64)"
)]
pub struct SetTrustlineRequestV2Call {
    pub creditor: Address,
    pub debtor: Address,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
    pub transfer: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "freezeNetwork", abi = "freezeNetwork()")]
pub struct FreezeNetworkCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "unfreezeNetwork", abi = "unfreezeNetwork()")]
pub struct UnfreezeNetworkCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "removeOwner", abi = "removeOwner()")]
pub struct RemoveOwnerCall;

// ---------------------------------------------------------------------------
// View functions (read on both source and destination)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "isNetworkFrozen", abi = "isNetworkFrozen()")]
pub struct IsNetworkFrozenCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct IsNetworkFrozenReturn(pub bool);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "owner", abi = "owner()")]
pub struct OwnerCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct OwnerReturn(pub Address);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "name", abi = "name()")]
pub struct NameCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct NameReturn(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "getAccount", abi = "getAccount(address,address)")]
pub struct GetAccountCall {
    pub a: Address,
    pub b: Address,
}

/// Account tuple as seen from `a`: what `a` gives, what `a` receives, and
/// the balance `b` owes `a`.
#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetAccountReturn {
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
    pub mtime: u32,
    pub balance: i128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "getDebt", abi = "getDebt(address,address)")]
pub struct GetDebtCall {
    pub debtor: Address,
    pub creditor: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetDebtReturn(pub i128);

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall, EthDisplay)]
#[ethcall(name = "onboarder", abi = "onboarder(address)")]
pub struct OnboarderCall {
    pub user: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct OnboarderReturn(pub Address);
