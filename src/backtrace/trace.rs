//! User-facing backtrace trace.
//!
//! When `trace_backtracing` is on, each step is logged at info level and kept
//! as a [`TraceEvent`] for structured consumers. When it is off nothing is
//! built at all.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Backtrace {
        production: String,
        already_backtraced: bool,
    },
    Grounds {
        wmes: Vec<String>,
    },
    Locals {
        wmes: Vec<String>,
    },
    Negated {
        conditions: Vec<String>,
    },
    TracingLocals,
    Local {
        wme: String,
    },
    CdpsPreference {
        preference: String,
    },
    NoTrace {
        wme: String,
    },
    QuiescenceDependency {
        wme: String,
    },
}

fn write_lines(f: &mut fmt::Formatter<'_>, header: &str, lines: &[String]) -> fmt::Result {
    write!(f, "  -->{header}:")?;
    for line in lines {
        write!(f, "\n     {line}")?;
    }
    Ok(())
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Backtrace {
                production,
                already_backtraced,
            } => {
                write!(f, "... BT through instantiation of {production}")?;
                if *already_backtraced {
                    f.write_str("\n(We already backtraced through this instantiation.)")?;
                }
                Ok(())
            }
            TraceEvent::Grounds { wmes } => write_lines(f, "Grounds", wmes),
            TraceEvent::Locals { wmes } => write_lines(f, "Locals", wmes),
            TraceEvent::Negated { conditions } => write_lines(f, "Negated", conditions),
            TraceEvent::TracingLocals => f.write_str("*** Tracing Locals ***"),
            TraceEvent::Local { wme } => write!(f, "For local {wme}"),
            TraceEvent::CdpsPreference { preference } => {
                write!(f, "     Backtracing through CDPS preference: {preference}")
            }
            TraceEvent::NoTrace { wme } => write!(f, "...no trace for {wme}, can't BT"),
            TraceEvent::QuiescenceDependency { wme } => {
                write!(f, "{wme} tests quiescence; the result is unreliable")
            }
        }
    }
}

/// Collects trace events for one session.
#[derive(Debug, Default)]
pub struct Tracer {
    enabled: bool,
    events: Vec<TraceEvent>,
}

impl Tracer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Record the event built by `make`, if tracing is on.
    pub fn emit(&mut self, make: impl FnOnce() -> TraceEvent) {
        if !self.enabled {
            return;
        }
        let event = make();
        tracing::info!("{event}");
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracer_builds_nothing() {
        let mut tracer = Tracer::new(false);
        tracer.emit(|| panic!("event built while tracing is off"));
        assert!(tracer.events().is_empty());
    }

    #[test]
    fn events_render_like_the_trace_output() {
        let mut tracer = Tracer::new(true);
        tracer.emit(|| TraceEvent::Backtrace {
            production: "propose*go".into(),
            already_backtraced: true,
        });
        tracer.emit(|| TraceEvent::Grounds {
            wmes: vec!["(3: S1 ^operator O1 +)".into()],
        });
        let events = tracer.into_events();
        assert_eq!(
            events[0].to_string(),
            "... BT through instantiation of propose*go\n(We already backtraced through this instantiation.)"
        );
        assert_eq!(events[1].to_string(), "  -->Grounds:\n     (3: S1 ^operator O1 +)");
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(TraceEvent::Local { wme: "(1: S2 ^x y)".into() }).unwrap();
        assert_eq!(json["event"], "local");
        assert_eq!(json["wme"], "(1: S2 ^x y)");
    }
}
