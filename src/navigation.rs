//! Page routing for the root context.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Home,
    Packages,
    Auth,
    Profile,
    Scan,
}

impl Page {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "home" => Some(Self::Home),
            "packages" | "pkgs" => Some(Self::Packages),
            "auth" | "login" => Some(Self::Auth),
            "profile" | "dashboard" => Some(Self::Profile),
            "scan" | "scanner" => Some(Self::Scan),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Packages => "packages",
            Self::Auth => "auth",
            Self::Profile => "profile",
            Self::Scan => "scan",
        }
    }

    /// Pages that need a signed-in user
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::Profile | Self::Scan)
    }
}

/// Tracks the current page and applies the session guard
#[derive(Debug, Default)]
pub struct Navigator {
    current: Page,
}

impl Navigator {
    pub fn current(&self) -> Page {
        self.current
    }

    /// Go to `page`, or to the auth page if it needs a session we don't have.
    /// Returns the page actually shown.
    pub fn navigate(&mut self, page: Page, signed_in: bool) -> Page {
        self.current = if page.requires_session() && !signed_in {
            Page::Auth
        } else {
            page
        };
        tracing::debug!(requested = page.as_str(), shown = self.current.as_str(), "navigate");
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_pages_redirect_to_auth() {
        let mut nav = Navigator::default();
        assert_eq!(nav.navigate(Page::Profile, false), Page::Auth);
        assert_eq!(nav.navigate(Page::Scan, false), Page::Auth);
        assert_eq!(nav.current(), Page::Auth);
    }

    #[test]
    fn test_open_pages_and_signed_in() {
        let mut nav = Navigator::default();
        assert_eq!(nav.current(), Page::Home);
        assert_eq!(nav.navigate(Page::Packages, false), Page::Packages);
        assert_eq!(nav.navigate(Page::Scan, true), Page::Scan);
        assert_eq!(nav.navigate(Page::Profile, true), Page::Profile);
    }

    #[test]
    fn test_page_parse() {
        assert_eq!(Page::from_str("Dashboard"), Some(Page::Profile));
        assert_eq!(Page::from_str("packages"), Some(Page::Packages));
        assert!(Page::from_str("nowhere").is_none());
    }
}
