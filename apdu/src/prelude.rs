//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    cplc::{CplcReq, CplcResp},
    frame::{encode_command, parse_command, split_response, ApduHeader},
    record::{RecordKey, SlotResp, StoreReq},
    select::{SelectReq, VAULT_AID},
    signed::{DeleteReq, MessageResp, ReadReq},
    status::StatusWord,
    ApduError, ApduStatic, Instruction,
};
