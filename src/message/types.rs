//! Wire-level type vocabulary shared by frontend and backend messages.

use zerocopy::byteorder::big_endian;

pub(crate) type I16Be = big_endian::I16;
pub(crate) type I32Be = big_endian::I32;
pub(crate) type U16Be = big_endian::U16;
pub(crate) type U32Be = big_endian::U32;

/// PostgreSQL object identifier. The wire field and every well-known type
/// constant are unsigned in practice, regardless of the `int4`-typed
/// `pg_type.oid` column's signed storage.
pub type Oid = u32;

/// Wire format discriminator used in `Bind`'s parameter/result format
/// lists and in `RowDescription`/`CopyInResponse` field descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FormatCode {
    #[default]
    Text = 0,
    Binary = 1,
}

impl FormatCode {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => FormatCode::Binary,
            _ => FormatCode::Text,
        }
    }
}

impl From<u16> for FormatCode {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

/// Transaction status byte carried by `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionStatus {
    #[default]
    Idle = b'I',
    InTransaction = b'T',
    Failed = b'E',
}

impl TransactionStatus {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn in_transaction(self) -> bool {
        matches!(
            self,
            TransactionStatus::InTransaction | TransactionStatus::Failed
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(self, TransactionStatus::Failed)
    }
}

/// Well-known PostgreSQL type OIDs, as published by `pg_type`.
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT2VECTOR: Oid = 22;
    pub const INT4: Oid = 23;
    pub const REGPROC: Oid = 24;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const TID: Oid = 27;
    pub const XID: Oid = 28;
    pub const CID: Oid = 29;
    pub const OIDVECTOR: Oid = 30;
    pub const PG_DDL_COMMAND: Oid = 32;
    pub const PG_TYPE: Oid = 71;
    pub const PG_ATTRIBUTE: Oid = 75;
    pub const PG_PROC: Oid = 81;
    pub const PG_CLASS: Oid = 83;
    pub const JSON: Oid = 114;
    pub const XML: Oid = 142;
    pub const PG_NODE_TREE: Oid = 194;
    pub const TABLE_AM_HANDLER: Oid = 269;
    pub const INDEX_AM_HANDLER: Oid = 325;
    pub const POINT: Oid = 600;
    pub const LSEG: Oid = 601;
    pub const PATH: Oid = 602;
    pub const BOX: Oid = 603;
    pub const POLYGON: Oid = 604;
    pub const LINE: Oid = 628;
    pub const CIDR: Oid = 650;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const UNKNOWN: Oid = 705;
    pub const CIRCLE: Oid = 718;
    pub const MACADDR8: Oid = 774;
    pub const MONEY: Oid = 790;
    pub const MACADDR: Oid = 829;
    pub const INET: Oid = 869;
    pub const ACLITEM: Oid = 1033;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const INTERVAL: Oid = 1186;
    pub const TIMETZ: Oid = 1266;
    pub const BIT: Oid = 1560;
    pub const VARBIT: Oid = 1562;
    pub const NUMERIC: Oid = 1700;
    pub const REFCURSOR: Oid = 1790;
    pub const REGPROCEDURE: Oid = 2202;
    pub const REGOPER: Oid = 2203;
    pub const REGOPERATOR: Oid = 2204;
    pub const REGCLASS: Oid = 2205;
    pub const REGTYPE: Oid = 2206;
    pub const RECORD: Oid = 2249;
    pub const CSTRING: Oid = 2275;
    pub const ANY: Oid = 2276;
    pub const ANYARRAY: Oid = 2277;
    pub const VOID: Oid = 2278;
    pub const TRIGGER: Oid = 2279;
    pub const LANGUAGE_HANDLER: Oid = 2280;
    pub const INTERNAL: Oid = 2281;
    pub const ANYELEMENT: Oid = 2283;
    pub const RECORD_ARRAY: Oid = 2287;
    pub const ANYNONARRAY: Oid = 2776;
    pub const UUID: Oid = 2950;
    pub const TXID_SNAPSHOT: Oid = 2970;
    pub const FDW_HANDLER: Oid = 3115;
    pub const PG_LSN: Oid = 3220;
    pub const TSM_HANDLER: Oid = 3310;
    pub const PG_NDISTINCT: Oid = 3361;
    pub const PG_DEPENDENCIES: Oid = 3402;
    pub const ANYENUM: Oid = 3500;
    pub const TSVECTOR: Oid = 3614;
    pub const TSQUERY: Oid = 3615;
    pub const GTSVECTOR: Oid = 3642;
    pub const REGCONFIG: Oid = 3734;
    pub const REGDICTIONARY: Oid = 3769;
    pub const JSONB: Oid = 3802;
    pub const ANYRANGE: Oid = 3831;
    pub const EVENT_TRIGGER: Oid = 3838;
    pub const INT4RANGE: Oid = 3904;
    pub const NUMRANGE: Oid = 3906;
    pub const TSRANGE: Oid = 3908;
    pub const TSTZRANGE: Oid = 3910;
    pub const DATERANGE: Oid = 3912;
    pub const INT8RANGE: Oid = 3926;
    pub const JSONPATH: Oid = 4072;
    pub const REGNAMESPACE: Oid = 4089;
    pub const REGROLE: Oid = 4096;
    pub const REGCOLLATION: Oid = 4191;
    pub const INT4MULTIRANGE: Oid = 4451;
    pub const NUMMULTIRANGE: Oid = 4532;
    pub const TSMULTIRANGE: Oid = 4533;
    pub const TSTZMULTIRANGE: Oid = 4534;
    pub const DATEMULTIRANGE: Oid = 4535;
    pub const INT8MULTIRANGE: Oid = 4536;
    pub const ANYMULTIRANGE: Oid = 4537;
    pub const ANYCOMPATIBLEMULTIRANGE: Oid = 4538;
    pub const PG_BRIN_BLOOM_SUMMARY: Oid = 4600;
    pub const PG_BRIN_MINMAX_MULTI_SUMMARY: Oid = 4601;
    pub const PG_MCV_LIST: Oid = 5017;
    pub const PG_SNAPSHOT: Oid = 5038;
    pub const XID8: Oid = 5069;
    pub const ANYCOMPATIBLE: Oid = 5077;
    pub const ANYCOMPATIBLEARRAY: Oid = 5078;
    pub const ANYCOMPATIBLENONARRAY: Oid = 5079;
    pub const ANYCOMPATIBLERANGE: Oid = 5080;
    pub const REGDATABASE: Oid = 8326;
}

/// The format the server should be asked for given an OID, when the caller
/// hasn't pinned one explicitly. NUMERIC's binary encoding is unwieldy to
/// hand-roll relative to its text form, so it is requested as text.
pub fn preferred_format(type_oid: Oid) -> FormatCode {
    match type_oid {
        oid::NUMERIC => FormatCode::Text,
        _ => FormatCode::Binary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_status_round_trips() {
        assert_eq!(
            TransactionStatus::from_byte(b'I'),
            Some(TransactionStatus::Idle)
        );
        assert_eq!(
            TransactionStatus::from_byte(b'T'),
            Some(TransactionStatus::InTransaction)
        );
        assert_eq!(
            TransactionStatus::from_byte(b'E'),
            Some(TransactionStatus::Failed)
        );
        assert_eq!(TransactionStatus::from_byte(b'?'), None);
        assert!(TransactionStatus::Failed.in_transaction());
        assert!(TransactionStatus::Failed.is_failed());
        assert!(!TransactionStatus::Idle.in_transaction());
    }

    #[test]
    fn numeric_prefers_text() {
        assert_eq!(preferred_format(oid::NUMERIC), FormatCode::Text);
        assert_eq!(preferred_format(oid::INT4), FormatCode::Binary);
    }
}
