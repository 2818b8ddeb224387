//! Template expansion and semantic validation.

use std::collections::{BTreeMap, HashSet};

use chorebot_state::{Expression, StateDecl};
use gamekey::GameKey;
use tracing::{debug, warn};

use crate::{
    Error,
    profile::{HandlerSpec, OpKind, OpSpec, PressWay, Profile, SceneSpec, SwitchDirection},
    raw::{DEFAULT_PRESS_TIME, RawHandler, RawOp, RawOpKind, RawProfile, RawScene, RawWay},
};

/// Resolve a parsed document into a [`Profile`].
pub(crate) fn resolve(raw: &RawProfile, fallback_name: &str) -> Result<Profile, Error> {
    if raw.tick_ms == 0 {
        return Err(Error::invalid("tick_ms", "must be at least 1"));
    }
    if raw.scenes.is_empty() {
        return Err(Error::invalid("scenes", "profile declares no scenes"));
    }

    let mut r = Resolver::new(raw)?;
    let mut scenes: Vec<SceneSpec> = Vec::with_capacity(raw.scenes.len());
    for (i, s) in raw.scenes.iter().enumerate() {
        let at = format!("scenes[{}]", i);
        let scene = r.scene(s, &at)?;
        if scenes.iter().any(|x| x.label == scene.label) {
            return Err(Error::invalid(
                format!("{at}.label"),
                format!("duplicate scene label `{}`", scene.label),
            ));
        }
        scenes.push(scene);
    }

    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback_name)
        .to_string();
    debug!(
        profile = %name,
        scenes = scenes.len(),
        states = r.states.len(),
        "profile_resolved"
    );
    Ok(Profile {
        name,
        tick_ms: raw.tick_ms,
        states: r.states,
        scenes,
    })
}

/// Longest delay, hold, wait or scene interval a profile may ask for.
const MAX_SECONDS: f64 = 86_400.0;

/// Check a number of seconds: finite, non-negative and at most [`MAX_SECONDS`].
fn seconds(s: f64, at: String) -> Result<f64, Error> {
    if !s.is_finite() || s < 0.0 {
        return Err(Error::invalid(
            at,
            format!("must be a non-negative number of seconds, got {}", s),
        ));
    }
    if s > MAX_SECONDS {
        return Err(Error::invalid(
            at,
            format!("must be at most {} seconds, got {}", MAX_SECONDS, s),
        ));
    }
    Ok(s)
}

/// Validate an optional duration in seconds.
fn duration(v: Option<f64>, at: String) -> Result<Option<f64>, Error> {
    v.map(|s| seconds(s, at)).transpose()
}

/// Characters that cannot appear in a state name referenced from an expression.
const RESERVED_NAME_CHARS: [char; 3] = [',', '[', ']'];

struct Resolver<'a> {
    handler_templates: &'a BTreeMap<String, RawHandler>,
    operation_templates: &'a BTreeMap<String, Vec<RawOp>>,
    strict: bool,
    declared: HashSet<String>,
    /// Declared states followed by implied ones, in first-seen order.
    states: Vec<StateDecl>,
}

impl<'a> Resolver<'a> {
    fn new(raw: &'a RawProfile) -> Result<Self, Error> {
        let mut declared = HashSet::new();
        let mut states = Vec::with_capacity(raw.states.len());
        for (i, st) in raw.states.iter().enumerate() {
            let at = format!("states[{}].name", i);
            let name = st.name.trim();
            if name.is_empty() {
                return Err(Error::invalid(at, "state name is empty"));
            }
            if name.contains(RESERVED_NAME_CHARS) {
                return Err(Error::invalid(
                    at,
                    format!("state name `{}` cannot contain `,`, `[` or `]`", name),
                ));
            }
            if !declared.insert(name.to_string()) {
                return Err(Error::invalid(at, format!("duplicate state `{}`", name)));
            }
            let group = st
                .mutex_group
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty());
            states.push(match group {
                Some(g) => StateDecl::grouped(name, g),
                None => StateDecl::plain(name),
            });
        }
        Ok(Self {
            handler_templates: &raw.handler_templates,
            operation_templates: &raw.operation_templates,
            strict: raw.strict_states,
            declared,
            states,
        })
    }

    /// Note a reference to state `name` made at `at`.
    fn reference(&mut self, name: &str, at: &str) -> Result<(), Error> {
        let name = name.trim();
        if self.declared.contains(name) {
            return Ok(());
        }
        if name.is_empty() {
            return Err(Error::invalid(at, "state name is empty"));
        }
        if self.strict {
            return Err(Error::invalid(at, format!("undeclared state `{}`", name)));
        }
        debug!(state = name, at, "implicit_state");
        self.declared.insert(name.to_string());
        self.states.push(StateDecl::plain(name));
        Ok(())
    }

    fn scene(&mut self, raw: &RawScene, at: &str) -> Result<SceneSpec, Error> {
        seconds(raw.interval, format!("{at}.interval"))?;
        if raw.handlers.is_empty() {
            return Err(Error::invalid(
                format!("{at}.handlers"),
                "scene has no handlers",
            ));
        }
        let mut triggers = Vec::with_capacity(raw.triggers.len());
        for (j, t) in raw.triggers.iter().enumerate() {
            self.reference(t, &format!("{at}.triggers[{j}]"))?;
            triggers.push(t.trim().to_string());
        }
        let mut handlers = Vec::with_capacity(raw.handlers.len());
        for (j, h) in raw.handlers.iter().enumerate() {
            handlers.push(self.handler(h, &format!("{at}.handlers[{j}]"), &mut Vec::new())?);
        }
        Ok(SceneSpec {
            label: raw
                .label
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| at.to_string()),
            interval: raw.interval,
            priority: raw.priority,
            triggers,
            handlers,
        })
    }

    /// Resolve one handler subtree. `stack` holds the templates expanded on
    /// the way down, so a template nested inside its own body is a cycle.
    fn handler(
        &mut self,
        raw: &RawHandler,
        at: &str,
        stack: &mut Vec<String>,
    ) -> Result<HandlerSpec, Error> {
        let mark = stack.len();
        let expanded = self.expand_handler(raw.clone(), at, stack)?;

        let condition = match expanded.states.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Expression::compile(text)
                .map_err(|e| Error::invalid(format!("{at}.states"), e.to_string()))?,
            _ => Expression::always(),
        };
        for name in condition.state_names() {
            self.reference(name, &format!("{at}.states"))?;
        }

        let mut children = Vec::new();
        for (k, c) in expanded.sub_handlers.iter().flatten().enumerate() {
            children.push(self.handler(c, &format!("{at}.sub_handlers[{k}]"), stack)?);
        }
        stack.truncate(mark);
        let operations = self.operations(
            expanded.operations.as_deref().unwrap_or_default(),
            &format!("{at}.operations"),
            &mut Vec::new(),
        )?;
        if children.is_empty() && operations.is_empty() {
            warn!(at, "handler_without_operations");
        }

        Ok(HandlerSpec {
            label: expanded
                .label
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| at.to_string()),
            condition,
            children,
            operations,
        })
    }

    /// Replace a template reference with the template body, overlaid with local fields.
    ///
    /// Every template expanded is left on `stack`; the caller truncates it.
    fn expand_handler(
        &self,
        raw: RawHandler,
        at: &str,
        stack: &mut Vec<String>,
    ) -> Result<RawHandler, Error> {
        let Some(name) = raw.template.clone() else {
            return Ok(raw);
        };
        if stack.contains(&name) {
            stack.push(name);
            return Err(Error::invalid(
                format!("{at}.template"),
                format!("handler template cycle: {}", stack.join(" -> ")),
            ));
        }
        let base = self.handler_templates.get(&name).ok_or_else(|| {
            Error::invalid(
                format!("{at}.template"),
                format!("unknown handler template `{}`", name),
            )
        })?;
        stack.push(name.clone());
        let base = self.expand_handler(
            base.clone(),
            &format!("handler_templates.{}", name),
            stack,
        )?;
        Ok(raw.overlay(base))
    }

    /// Resolve an operation list, splicing in referenced templates.
    fn operations(
        &mut self,
        raws: &[RawOp],
        at: &str,
        stack: &mut Vec<String>,
    ) -> Result<Vec<OpSpec>, Error> {
        let templates = self.operation_templates;
        let mut out = Vec::with_capacity(raws.len());
        for (i, raw) in raws.iter().enumerate() {
            let here = format!("{at}[{i}]");
            let Some(name) = &raw.template else {
                out.push(self.operation(raw, &here)?);
                continue;
            };
            if !raw.is_bare_template() {
                return Err(Error::invalid(
                    here,
                    "an operation referencing a template takes no other fields",
                ));
            }
            if stack.contains(name) {
                stack.push(name.clone());
                return Err(Error::invalid(
                    format!("{here}.template"),
                    format!("operation template cycle: {}", stack.join(" -> ")),
                ));
            }
            let body = templates.get(name).ok_or_else(|| {
                Error::invalid(
                    format!("{here}.template"),
                    format!("unknown operation template `{}`", name),
                )
            })?;
            stack.push(name.clone());
            out.extend(self.operations(
                body,
                &format!("operation_templates.{}", name),
                stack,
            )?);
            stack.pop();
        }
        Ok(out)
    }

    fn operation(&mut self, raw: &RawOp, at: &str) -> Result<OpSpec, Error> {
        let Some(kind) = raw.op else {
            return Err(Error::invalid(
                format!("{at}.op"),
                "missing `op` (or `template`)",
            ));
        };
        if let Some(field) = raw.stray_field(kind) {
            return Err(Error::invalid(
                format!("{at}.{field}"),
                format!("`{}` does not apply to `{}`", field, kind.as_str()),
            ));
        }
        let pre_delay = duration(raw.pre_delay, format!("{at}.pre_delay"))?.unwrap_or(0.0);
        let post_delay = duration(raw.post_delay, format!("{at}.post_delay"))?.unwrap_or(0.0);

        let op = match kind {
            RawOpKind::Press => {
                let key = key(raw.key.as_deref(), at)?;
                let way = match raw.way.unwrap_or(RawWay::Tap) {
                    RawWay::Tap => PressWay::Tap,
                    RawWay::Down => PressWay::Down,
                    RawWay::Up => PressWay::Up,
                };
                let repeat = raw.repeat.unwrap_or(1);
                if repeat < 1 {
                    return Err(Error::invalid(format!("{at}.repeat"), "must be at least 1"));
                }
                if repeat > 1 && way != PressWay::Tap {
                    return Err(Error::invalid(
                        format!("{at}.repeat"),
                        "repeat only applies to taps",
                    ));
                }
                OpKind::Press {
                    key,
                    way,
                    press_time: duration(raw.press_time, format!("{at}.press_time"))?
                        .unwrap_or(DEFAULT_PRESS_TIME),
                    repeat,
                    interval: duration(raw.interval, format!("{at}.interval"))?.unwrap_or(0.0),
                }
            }
            RawOpKind::Hold => {
                let key = key(raw.key.as_deref(), at)?;
                let seconds = duration(raw.seconds, format!("{at}.seconds"))?;
                if seconds.is_none() && !raw.is_async {
                    return Err(Error::invalid(
                        format!("{at}.seconds"),
                        "a hold without `seconds` must be `async`",
                    ));
                }
                OpKind::Hold { key, seconds }
            }
            RawOpKind::Wait => {
                let seconds = duration(raw.seconds, format!("{at}.seconds"))?.ok_or_else(|| {
                    Error::invalid(format!("{at}.seconds"), "`wait` requires `seconds`")
                })?;
                OpKind::Wait { seconds }
            }
            RawOpKind::SetState | RawOpKind::ClearState => {
                let names = raw.state_names();
                if names.is_empty() {
                    return Err(Error::invalid(
                        format!("{at}.state"),
                        format!("`{}` requires `state` or `state_list`", kind.as_str()),
                    ));
                }
                for n in &names {
                    self.reference(n, &format!("{at}.state"))?;
                }
                let names: Vec<String> = names.iter().map(|n| n.trim().to_string()).collect();
                if kind == RawOpKind::ClearState {
                    OpKind::ClearState { names }
                } else {
                    let offset = raw.offset.unwrap_or(0.0);
                    if !offset.is_finite() {
                        return Err(Error::invalid(format!("{at}.offset"), "must be finite"));
                    }
                    OpKind::SetState {
                        names,
                        value: raw.value,
                        value_add: raw.value_add,
                        offset,
                    }
                }
            }
            RawOpKind::Switch => {
                let target = raw.target.as_deref().ok_or_else(|| {
                    Error::invalid(format!("{at}.target"), "`switch` requires `target`")
                })?;
                let direction = SwitchDirection::parse(target).ok_or_else(|| {
                    Error::invalid(
                        format!("{at}.target"),
                        format!("switch target must be `next` or `prev`, got `{}`", target),
                    )
                })?;
                OpKind::Switch { direction }
            }
        };

        Ok(OpSpec {
            kind: op,
            pre_delay,
            post_delay,
            is_async: raw.is_async,
        })
    }
}

/// Parse a key spec, reporting the location of `key` on failure.
fn key(spec: Option<&str>, at: &str) -> Result<GameKey, Error> {
    let spec = spec.ok_or_else(|| Error::invalid(format!("{at}.key"), "missing `key`"))?;
    GameKey::from_spec(spec)
        .ok_or_else(|| Error::invalid(format!("{at}.key"), format!("unknown key `{}`", spec)))
}
