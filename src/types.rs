//! ADO data type codes, type-code groupings, and the DB-API type markers.
//!
//! Columns and parameters carry the provider's raw `adTypeEnum` code; the
//! groupings below drive converter selection and category matching.

/// Raw ADO `adTypeEnum` value as reported by the provider.
pub type TypeCode = u16;

pub const AD_EMPTY: TypeCode = 0;
pub const AD_SMALL_INT: TypeCode = 2;
pub const AD_INTEGER: TypeCode = 3;
pub const AD_SINGLE: TypeCode = 4;
pub const AD_DOUBLE: TypeCode = 5;
pub const AD_CURRENCY: TypeCode = 6;
pub const AD_DATE: TypeCode = 7;
pub const AD_BSTR: TypeCode = 8;
pub const AD_ERROR: TypeCode = 10;
pub const AD_BOOLEAN: TypeCode = 11;
pub const AD_VARIANT: TypeCode = 12;
pub const AD_DECIMAL: TypeCode = 14;
pub const AD_TINY_INT: TypeCode = 16;
pub const AD_UNSIGNED_TINY_INT: TypeCode = 17;
pub const AD_UNSIGNED_SMALL_INT: TypeCode = 18;
pub const AD_UNSIGNED_INT: TypeCode = 19;
pub const AD_BIG_INT: TypeCode = 20;
pub const AD_UNSIGNED_BIG_INT: TypeCode = 21;
pub const AD_FILE_TIME: TypeCode = 64;
pub const AD_GUID: TypeCode = 72;
pub const AD_BINARY: TypeCode = 128;
pub const AD_CHAR: TypeCode = 129;
pub const AD_WCHAR: TypeCode = 130;
pub const AD_NUMERIC: TypeCode = 131;
pub const AD_DB_DATE: TypeCode = 133;
pub const AD_DB_TIME: TypeCode = 134;
pub const AD_DB_TIMESTAMP: TypeCode = 135;
pub const AD_CHAPTER: TypeCode = 136;
pub const AD_VAR_NUMERIC: TypeCode = 139;
pub const AD_VAR_CHAR: TypeCode = 200;
pub const AD_LONG_VAR_CHAR: TypeCode = 201;
pub const AD_VAR_WCHAR: TypeCode = 202;
pub const AD_LONG_VAR_WCHAR: TypeCode = 203;
pub const AD_VAR_BINARY: TypeCode = 204;
pub const AD_LONG_VAR_BINARY: TypeCode = 205;

/// `adFldMayBeNull` bit in a field's attribute mask.
pub const FIELD_MAY_BE_NULL: u32 = 0x40;

pub const INTEGER_TYPES: &[TypeCode] = &[
    AD_INTEGER,
    AD_SMALL_INT,
    AD_TINY_INT,
    AD_UNSIGNED_INT,
    AD_UNSIGNED_SMALL_INT,
    AD_UNSIGNED_TINY_INT,
    AD_ERROR,
];
pub const ROW_ID_TYPES: &[TypeCode] = &[AD_CHAPTER];
pub const LONG_TYPES: &[TypeCode] = &[AD_BIG_INT, AD_UNSIGNED_BIG_INT, AD_FILE_TIME];
pub const EXACT_NUMERIC_TYPES: &[TypeCode] = &[AD_DECIMAL, AD_NUMERIC, AD_VAR_NUMERIC, AD_CURRENCY];
pub const APPROXIMATE_NUMERIC_TYPES: &[TypeCode] = &[AD_DOUBLE, AD_SINGLE];
pub const BOOLEAN_TYPES: &[TypeCode] = &[AD_BOOLEAN];
pub const STRING_TYPES: &[TypeCode] = &[
    AD_BSTR,
    AD_CHAR,
    AD_LONG_VAR_CHAR,
    AD_LONG_VAR_WCHAR,
    AD_VAR_CHAR,
    AD_VAR_WCHAR,
    AD_WCHAR,
    AD_GUID,
];
pub const BINARY_TYPES: &[TypeCode] = &[AD_BINARY, AD_LONG_VAR_BINARY, AD_VAR_BINARY];
pub const DATETIME_TYPES: &[TypeCode] = &[AD_DB_TIME, AD_DB_TIMESTAMP, AD_DATE, AD_DB_DATE];

/// DB-API type marker: an opaque set of provider type codes comparable
/// against a column's reported code.
#[derive(Debug, Clone, Copy)]
pub struct DbTypeSet {
    sets: &'static [&'static [TypeCode]],
}

impl DbTypeSet {
    const fn new(sets: &'static [&'static [TypeCode]]) -> Self {
        Self { sets }
    }

    #[must_use]
    pub fn matches(&self, code: TypeCode) -> bool {
        self.sets.iter().any(|set| set.contains(&code))
    }
}

impl PartialEq<TypeCode> for DbTypeSet {
    fn eq(&self, other: &TypeCode) -> bool {
        self.matches(*other)
    }
}

impl PartialEq<DbTypeSet> for TypeCode {
    fn eq(&self, other: &DbTypeSet) -> bool {
        other.matches(*self)
    }
}

pub const STRING: DbTypeSet = DbTypeSet::new(&[STRING_TYPES]);
pub const BINARY: DbTypeSet = DbTypeSet::new(&[BINARY_TYPES]);
pub const NUMBER: DbTypeSet = DbTypeSet::new(&[
    BOOLEAN_TYPES,
    INTEGER_TYPES,
    LONG_TYPES,
    EXACT_NUMERIC_TYPES,
    APPROXIMATE_NUMERIC_TYPES,
]);
pub const DATETIME: DbTypeSet = DbTypeSet::new(&[DATETIME_TYPES]);
/// Of limited use against SQL Server, where row ids are plain integers.
pub const ROWID: DbTypeSet = DbTypeSet::new(&[ROW_ID_TYPES]);

/// Coarse column category, computed from the raw type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    String,
    Binary,
    Number,
    DateTime,
    RowId,
}

#[must_use]
pub fn column_matches_category(code: TypeCode, category: TypeCategory) -> bool {
    let marker = match category {
        TypeCategory::String => STRING,
        TypeCategory::Binary => BINARY,
        TypeCategory::Number => NUMBER,
        TypeCategory::DateTime => DATETIME,
        TypeCategory::RowId => ROWID,
    };
    marker.matches(code)
}

/// The ADO name of a type code, if it is one we know.
#[must_use]
pub fn type_name(code: TypeCode) -> Option<&'static str> {
    Some(match code {
        AD_EMPTY => "adEmpty",
        AD_SMALL_INT => "adSmallInt",
        AD_INTEGER => "adInteger",
        AD_SINGLE => "adSingle",
        AD_DOUBLE => "adDouble",
        AD_CURRENCY => "adCurrency",
        AD_DATE => "adDate",
        AD_BSTR => "adBSTR",
        AD_ERROR => "adError",
        AD_BOOLEAN => "adBoolean",
        AD_VARIANT => "adVariant",
        AD_DECIMAL => "adDecimal",
        AD_TINY_INT => "adTinyInt",
        AD_UNSIGNED_TINY_INT => "adUnsignedTinyInt",
        AD_UNSIGNED_SMALL_INT => "adUnsignedSmallInt",
        AD_UNSIGNED_INT => "adUnsignedInt",
        AD_BIG_INT => "adBigInt",
        AD_UNSIGNED_BIG_INT => "adUnsignedBigInt",
        AD_FILE_TIME => "adFileTime",
        AD_GUID => "adGUID",
        AD_BINARY => "adBinary",
        AD_CHAR => "adChar",
        AD_WCHAR => "adWChar",
        AD_NUMERIC => "adNumeric",
        AD_DB_DATE => "adDBDate",
        AD_DB_TIME => "adDBTime",
        AD_DB_TIMESTAMP => "adDBTimeStamp",
        AD_CHAPTER => "adChapter",
        AD_VAR_NUMERIC => "adVarNumeric",
        AD_VAR_CHAR => "adVarChar",
        AD_LONG_VAR_CHAR => "adLongVarChar",
        AD_VAR_WCHAR => "adVarWChar",
        AD_LONG_VAR_WCHAR => "adLongVarWChar",
        AD_VAR_BINARY => "adVarBinary",
        AD_LONG_VAR_BINARY => "adLongVarBinary",
        _ => return None,
    })
}

/// Type name for error dumps; unknown codes render as `N (unknown type)`.
#[must_use]
pub fn describe_type(code: TypeCode) -> String {
    type_name(code).map_or_else(|| format!("{code} (unknown type)"), str::to_string)
}
