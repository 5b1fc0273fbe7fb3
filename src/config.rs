/// Local policy that shapes NTLMv1 responses.
///
/// Neither setting is negotiated; both sides have to be configured consistently beforehand.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ResponseOptions {
    /// Send only an LM response (the NT response stays empty).
    ///
    /// Takes precedence over extended session security. Defaults to `false`.
    pub lm_authentication: bool,

    /// Copy the NT response into the LM response instead of computing a real LM response when
    /// NTLMv1 without extended session security is used.
    ///
    /// Corresponds to `NoLMResponseNTLMv1` in MS-NLMP 3.1.1.1. Defaults to `true`, as on Windows.
    pub no_lm_response_ntlm_v1: bool,
}
impl ResponseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lm_authentication(mut self, lm_authentication: bool) -> Self {
        self.lm_authentication = lm_authentication;
        self
    }

    pub fn with_no_lm_response_ntlm_v1(mut self, no_lm_response_ntlm_v1: bool) -> Self {
        self.no_lm_response_ntlm_v1 = no_lm_response_ntlm_v1;
        self
    }
}
impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            lm_authentication: false,
            no_lm_response_ntlm_v1: true,
        }
    }
}
