//! URL fragment routing.
//!
//! The only route is the filter: `#/`, `#/active` and `#/done`. Anything the
//! router does not recognise shows everything.

use crate::events::TodoEvent;
use crate::model::Showing;

/// A parsed route
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Route {
    /// Filter named by the route
    pub showing: Showing,
}

impl Route {
    /// Parse a URL fragment such as `#/active`
    ///
    /// Leading `#` and `/` are optional, so `active` and `/active` parse the
    /// same way. Unknown or empty fragments select [`Showing::All`].
    #[must_use]
    pub fn parse(fragment: &str) -> Self {
        let segment = fragment
            .trim()
            .trim_start_matches('#')
            .trim_start_matches('/')
            .split(['/', '?'])
            .next()
            .unwrap_or_default();

        let showing = segment.parse().unwrap_or_else(|_| {
            if !segment.is_empty() {
                tracing::debug!(fragment, "Unrecognised route, showing all tasks");
            }
            Showing::All
        });
        Self { showing }
    }

    /// The fragment that leads back to this route
    #[must_use]
    pub const fn fragment(self) -> &'static str {
        match self.showing {
            Showing::All => "#/",
            Showing::Active => "#/active",
            Showing::Done => "#/done",
        }
    }

    /// The event that makes the application show this route
    #[must_use]
    pub const fn into_event(self) -> TodoEvent {
        TodoEvent::SetShowing {
            showing: self.showing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_fragments() {
        assert_eq!(Route::parse("#/").showing, Showing::All);
        assert_eq!(Route::parse("#/all").showing, Showing::All);
        assert_eq!(Route::parse("#/active").showing, Showing::Active);
        assert_eq!(Route::parse("#/done").showing, Showing::Done);
        assert_eq!(Route::parse("done").showing, Showing::Done);
        assert_eq!(Route::parse("/active/").showing, Showing::Active);
    }

    #[test]
    fn test_unknown_fragments_show_all() {
        for fragment in ["", "#", "#/bogus", "#/Active", "completed"] {
            assert_eq!(Route::parse(fragment).showing, Showing::All, "{fragment}");
        }
    }

    #[test]
    fn test_fragment_round_trips() {
        for showing in Showing::ALL {
            let route = Route { showing };
            assert_eq!(Route::parse(route.fragment()), route);
        }
    }

    #[test]
    fn test_route_becomes_set_showing() {
        assert_eq!(
            Route::parse("#/active").into_event(),
            TodoEvent::SetShowing {
                showing: Showing::Active
            }
        );
    }
}
