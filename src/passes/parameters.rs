//! Parameter discovery and symbol mapping.

use std::collections::BTreeMap;

use crate::ir::{Exp, ExpRewrite, Operator, SharedExp, Type};
use crate::passes::{Pass, PassContext, PassId};
use crate::program::Parameter;
use crate::Result;

/// Matches a stack slot `m[sp +/- K]` in stripped form, returning the signed
/// byte offset from the entry stack pointer.
fn stack_offset(e: &Exp, sp: u16) -> Option<i64> {
    let Exp::Unary(Operator::MemOf, addr) = e else {
        return None;
    };
    let sp_exp = Exp::reg(sp);
    match &**addr {
        Exp::Binary(Operator::Minus, base, off) if **base == *sp_exp => {
            off.int_value().map(|k| -k)
        }
        Exp::Binary(Operator::Plus, base, off) if **base == *sp_exp => off.int_value(),
        _ => None,
    }
}

/// Finds the final parameters: locations read before any definition.
///
/// After the pipeline stabilizes, a use subscripted with the implicit (entry)
/// definition is a value flowing in from the caller: a register parameter,
/// or an incoming stack slot above the return address.
pub struct FinalParameterSearchPass;

impl Pass for FinalParameterSearchPass {
    fn id(&self) -> PassId {
        PassId::FinalParameterSearch
    }

    fn name(&self) -> &'static str {
        "FinalParameterSearch"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let sp = ctx.prog.stack_reg;
        let mut found: Vec<SharedExp> = Vec::new();

        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            for use_exp in stmt.uses() {
                let Exp::Subscript(base, None) = &*use_exp else {
                    continue;
                };
                let stripped = base.strip_subscripts();
                let is_candidate = match stripped.reg_id() {
                    Some(r) => r != sp,
                    None => stack_offset(&stripped, sp).is_some_and(|k| k > 0),
                };
                if is_candidate && !found.contains(&stripped) {
                    found.push(stripped);
                }
            }
        });

        // Registers first in numeric order, then stack slots by offset
        found.sort_by_key(|loc| match loc.reg_id() {
            Some(r) => (0, i64::from(r)),
            None => (1, stack_offset(loc, sp).unwrap_or(i64::MAX)),
        });

        let mut changed = false;
        for loc in found {
            if ctx.proc.params.iter().any(|p| p.exp == loc) {
                continue;
            }
            let name = match loc.reg_id() {
                Some(r) => ctx.prog.reg_name(r),
                None => format!("arg{}", stack_offset(&loc, sp).unwrap_or(0) / 4),
            };
            ctx.proc.params.push(Parameter {
                name,
                ty: Type::integer(32),
                exp: loc,
            });
            changed = true;
        }

        Ok(changed)
    }
}

/// Names the final parameters `param1..paramN` and registers them in the
/// symbol map so the back end prints the names.
pub struct ParameterSymbolMapPass;

impl Pass for ParameterSymbolMapPass {
    fn id(&self) -> PassId {
        PassId::ParameterSymbolMap
    }

    fn name(&self) -> &'static str {
        "ParameterSymbolMap"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let mut changed = false;
        let params: Vec<(usize, SharedExp)> = ctx
            .proc
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.exp.clone()))
            .collect();

        for (i, exp) in params {
            let name = format!("param{}", i + 1);
            if ctx.proc.params[i].name != name {
                ctx.proc.params[i].name = name.clone();
                changed = true;
            }
            if ctx.proc.lookup_sym(&exp) != Some(name.as_str()) {
                ctx.proc.map_symbol(exp, &name);
                changed = true;
            }
        }

        Ok(changed)
    }
}

/// Maps stack slots to named locals and incoming-argument slots.
///
/// Slots below the entry stack pointer become `local0..localN`; slots above
/// it are incoming arguments and join the parameter list. Both get symbol
/// mappings; the statements themselves keep their structural form.
pub struct LocalAndParamMapPass;

impl Pass for LocalAndParamMapPass {
    fn id(&self) -> PassId {
        PassId::LocalAndParamMap
    }

    fn name(&self) -> &'static str {
        "LocalAndParamMap"
    }

    fn execute(&self, ctx: &mut PassContext) -> Result<bool> {
        let sp = ctx.prog.stack_reg;

        // Distinct slots, keyed by offset for stable naming
        let mut slots: BTreeMap<i64, SharedExp> = BTreeMap::new();
        ctx.proc.cfg.for_each_statement(&mut |_, stmt| {
            let mut record = |e: &SharedExp| {
                e.visit_pre(&mut |sub| {
                    let stripped = sub.strip_subscripts();
                    if let Some(k) = stack_offset(&stripped, sp) {
                        slots.entry(k).or_insert(stripped);
                    }
                    true
                });
            };
            stmt.for_each_use(&mut record);
            for def in stmt.defines() {
                record(&def);
            }
        });

        let mut changed = false;
        let mut local_idx = ctx.proc.locals.len();
        for (offset, exp) in slots {
            if ctx.proc.lookup_sym(&exp).is_some() {
                continue;
            }
            if offset < 0 {
                let name = format!("local{local_idx}");
                local_idx += 1;
                ctx.proc.locals.insert(name.clone(), Type::integer(32));
                ctx.proc.map_symbol(exp, &name);
            } else {
                let name = format!("arg{}", offset / 4);
                if !ctx.proc.params.iter().any(|p| p.exp == exp) {
                    ctx.proc.params.push(Parameter {
                        name: name.clone(),
                        ty: Type::integer(32),
                        exp: exp.clone(),
                    });
                }
                ctx.proc.map_symbol(exp, &name);
            }
            changed = true;
        }

        Ok(changed)
    }
}
