/// API middleware
///
/// - `claims`: extraction of gateway-verified tenant claims

pub mod claims;
