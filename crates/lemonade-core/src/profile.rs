/// The two places the shop mounts a chat assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistantProfile {
    Customer,
    Admin,
}

impl AssistantProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantProfile::Customer => "customer",
            AssistantProfile::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(AssistantProfile::Customer),
            "admin" => Some(AssistantProfile::Admin),
            _ => None,
        }
    }

    pub fn all() -> Vec<AssistantProfile> {
        vec![AssistantProfile::Customer, AssistantProfile::Admin]
    }

    /// Profiles reachable for the current user.
    pub fn available(is_admin: bool) -> Vec<AssistantProfile> {
        if is_admin {
            Self::all()
        } else {
            vec![AssistantProfile::Customer]
        }
    }

    /// Name of the edge function serving this assistant.
    pub fn function_name(&self) -> &'static str {
        match self {
            AssistantProfile::Customer => "customer-ai",
            AssistantProfile::Admin => "admin-ai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AssistantProfile::Customer => "Lemonade Expert 🍋",
            AssistantProfile::Admin => "AI Business Assistant",
        }
    }

    /// Opening assistant message shown before the first question.
    pub fn greeting(&self) -> Option<&'static str> {
        match self {
            AssistantProfile::Customer => {
                Some("Hey! 🍋 Looking for lemonade recommendations? I got you!")
            }
            AssistantProfile::Admin => None,
        }
    }

    /// Static notice appended when a request fails.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            AssistantProfile::Customer => "Oops! Something went wrong 😅 Try again?",
            AssistantProfile::Admin => "Sorry, I encountered an error. Please try again.",
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            AssistantProfile::Customer => "Ask about flavors, combos...",
            AssistantProfile::Admin => "Ask about the business...",
        }
    }

    /// Shown while the transcript is still empty.
    pub fn empty_hint(&self) -> &'static str {
        match self {
            AssistantProfile::Customer => "Looking for lemonade recommendations?",
            AssistantProfile::Admin => {
                "Ask me about inventory, pricing, sales strategies, or analytics!"
            }
        }
    }
}
