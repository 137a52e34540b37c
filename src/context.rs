use uuid::Uuid;

/// Request-scoped context handed to the engine on every call.
///
/// Nothing here is stored between calls; the executor only reads it to tag
/// log events.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    /// Which adapter issued the request (`http`, `tool`, `cli`, ...).
    pub caller: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            caller: None,
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    pub(crate) fn caller_label(&self) -> &str {
        self.caller.as_deref().unwrap_or("unknown")
    }
}

#[derive(Default)]
pub struct RequestContextBuilder {
    correlation_id: Option<Uuid>,
    caller: Option<String>,
}

impl RequestContextBuilder {
    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn build(self) -> RequestContext {
        RequestContext {
            correlation_id: self.correlation_id.unwrap_or_else(Uuid::new_v4),
            caller: self.caller,
        }
    }
}
