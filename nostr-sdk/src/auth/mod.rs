//! Authentication handshakes: NIP-42 against relays and NIP-98 for HTTP.

pub mod challenge;
pub mod http;

pub use self::challenge::{build_auth_event, AuthState, ChallengeSession};
pub use self::http::{authorize_request, create_auth_header, parse_auth_header, HttpMethod};
