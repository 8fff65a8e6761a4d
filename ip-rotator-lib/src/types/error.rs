use thiserror::Error;

/// Possible errors when interacting with `ip_rotator_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The cloud provider rejected the configured credentials.
    ///
    /// This is fatal: every other region would fail in the same way.
    #[error("AWS rejected the credentials in region `{region}`: {reason}")]
    Authentication {
        /// Region the rejected call was issued against
        region: String,
        /// Message returned by the service
        reason: String,
    },
    /// Creating the gateway in a region failed
    #[error("Cannot create gateway in region `{region}`: {reason}")]
    CreateGateway {
        /// Region of the failed gateway
        region: String,
        /// Message returned by the service
        reason: String,
    },
    /// The gateway was created but never became servable
    #[error("Gateway `{id}` in region `{region}` did not deploy: {reason}")]
    Deployment {
        /// Region of the gateway
        region: String,
        /// Resource id of the gateway
        id: String,
        /// Why the deployment is considered failed
        reason: String,
    },
    /// Listing the existing gateways of a region failed
    #[error("Cannot list gateways in region `{region}`: {reason}")]
    ListGateways {
        /// Region that was listed
        region: String,
        /// Message returned by the service
        reason: String,
    },
    /// Deleting a gateway failed
    #[error("Cannot delete gateway `{id}` in region `{region}`: {reason}")]
    DeleteGateway {
        /// Region of the gateway
        region: String,
        /// Resource id of the gateway
        id: String,
        /// Message returned by the service
        reason: String,
    },
    /// The gateway to delete does not exist (anymore)
    #[error("Gateway `{id}` in region `{region}` does not exist")]
    GatewayNotFound {
        /// Region of the gateway
        region: String,
        /// Resource id of the gateway
        id: String,
    },
    /// The cloud API throttled a request
    #[error("Too many requests against region `{region}`")]
    Throttled {
        /// Region that throttled the call
        region: String,
    },
    /// The given target can not be turned into an origin
    #[error("Invalid target `{0}`: {1}")]
    InvalidTarget(String, String),
    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse `{0}` as URL: {1}")]
    InvalidUrl(String, url::ParseError),
    /// A URL could not be moved onto a gateway endpoint
    #[error("Cannot route `{0}` through gateway `{1}`")]
    InvalidRewrite(String, String),
    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    /// A request is not for the target; the gateways cannot forward it
    #[error("`{0}` is not on the target origin, so no gateway can forward it")]
    ForeignOrigin(url::Url),
    /// There is no gateway to send a request through
    #[error("No gateway is available; provision at least one region")]
    NoGateways,
    /// The request client cannot be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),
}

impl ErrorKind {
    /// Return the region the error relates to, if any.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Authentication { region, .. }
            | Self::CreateGateway { region, .. }
            | Self::Deployment { region, .. }
            | Self::ListGateways { region, .. }
            | Self::DeleteGateway { region, .. }
            | Self::GatewayNotFound { region, .. }
            | Self::Throttled { region } => Some(region),
            _ => None,
        }
    }

    /// Returns `true` if retrying the same call makes no sense because
    /// every region would fail the same way.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Authentication {
                    region: r1,
                    reason: e1,
                },
                Self::Authentication {
                    region: r2,
                    reason: e2,
                },
            )
            | (
                Self::CreateGateway {
                    region: r1,
                    reason: e1,
                },
                Self::CreateGateway {
                    region: r2,
                    reason: e2,
                },
            )
            | (
                Self::ListGateways {
                    region: r1,
                    reason: e1,
                },
                Self::ListGateways {
                    region: r2,
                    reason: e2,
                },
            ) => r1 == r2 && e1 == e2,
            (
                Self::Deployment {
                    region: r1,
                    id: i1,
                    reason: e1,
                },
                Self::Deployment {
                    region: r2,
                    id: i2,
                    reason: e2,
                },
            )
            | (
                Self::DeleteGateway {
                    region: r1,
                    id: i1,
                    reason: e1,
                },
                Self::DeleteGateway {
                    region: r2,
                    id: i2,
                    reason: e2,
                },
            ) => r1 == r2 && i1 == i2 && e1 == e2,
            (
                Self::GatewayNotFound { region: r1, id: i1 },
                Self::GatewayNotFound { region: r2, id: i2 },
            ) => r1 == r2 && i1 == i2,
            (Self::Throttled { region: r1 }, Self::Throttled { region: r2 }) => r1 == r2,
            (Self::InvalidTarget(t1, e1), Self::InvalidTarget(t2, e2))
            | (Self::InvalidRewrite(t1, e1), Self::InvalidRewrite(t2, e2)) => t1 == t2 && e1 == e2,
            (Self::InvalidUrl(s1, e1), Self::InvalidUrl(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::ForeignOrigin(u1), Self::ForeignOrigin(u2)) => u1 == u2,
            (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::InvalidHeader(_), Self::InvalidHeader(_))
            | (Self::NoGateways, Self::NoGateways) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl From<(String, url::ParseError)> for ErrorKind {
    fn from(value: (String, url::ParseError)) -> Self {
        Self::InvalidUrl(value.0, value.1)
    }
}
