use chrono::{DateTime, Duration, Utc};

/// The category of profile data to query for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ProfileType {
    #[display("WALL")]
    Wall,
    #[display("HEAP")]
    Heap,
}

impl ProfileType {
    /// The tag the profiling backend uses for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::Wall => "WALL",
            ProfileType::Heap => "HEAP",
        }
    }
}

/// A time windowed query for the profiles of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileQuery {
    pub project_id: String,
    /// The service name the agent reported under.
    pub target: String,
    pub profile_type: ProfileType,
    /// Start of the window, inclusive.
    pub start_time: DateTime<Utc>,
    /// End of the window, inclusive.
    pub end_time: DateTime<Utc>,
    /// Only consider deployments in this zone.
    pub zone: Option<String>,
    /// Ask for the raw profile rather than the summarized function table.
    pub want_profile_bytes: bool,
}

impl ProfileQuery {
    /// Query the hour leading up to `now`.
    pub fn last_hour(
        project_id: impl Into<String>,
        target: impl Into<String>,
        profile_type: ProfileType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            target: target.into(),
            profile_type,
            start_time: now - Duration::hours(1),
            end_time: now,
            zone: None,
            want_profile_bytes: false,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_profile_bytes(mut self) -> Self {
        self.want_profile_bytes = true;
        self
    }
}

/// A fact that the profiles of a test case must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedProfile {
    pub profile_type: ProfileType,
    pub function_name: String,
    /// If set, the function must be attributed to this source file.
    pub source_file: Option<String>,
    /// If set, the function must be attributed to this line.
    pub line: Option<u32>,
}

impl ExpectedProfile {
    pub fn function(profile_type: ProfileType, function_name: &str) -> Self {
        Self {
            profile_type,
            function_name: function_name.to_string(),
            source_file: None,
            line: None,
        }
    }

    pub fn in_file(mut self, source_file: &str) -> Self {
        self.source_file = Some(source_file.to_string());
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}
