mod assertions;
mod backoff;
mod document;
pub mod pprof;
mod querier;
mod response;

pub mod prelude {
    pub use crate::assertions::{check_expected_profile, AssertionFailure, LineCheckError};
    pub use crate::backoff::{
        check_backoffs, count_backoffs, BackoffCheckError, BackoffMarkers, BackoffTally,
    };
    pub use crate::document::{
        FrameLine, FunctionTable, InvalidProfile, ProfileDocument, ResolvedLocation, StructuredProfile,
        SummarizedProfile,
    };
    pub use crate::querier::{ProfileQuerier, QueryError};
    pub use crate::response::{parse_query_response, ResponseError};
}
