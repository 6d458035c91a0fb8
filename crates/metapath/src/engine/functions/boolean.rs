use crate::engine::runtime::{CallCtx, Error};
use crate::xdm::Sequence;

pub(super) fn fn_true(_ctx: &CallCtx, _args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(true))
}

pub(super) fn fn_false(_ctx: &CallCtx, _args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(false))
}

pub(super) fn fn_not(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(!args[0].effective_boolean_value()?))
}

pub(super) fn fn_boolean(_ctx: &CallCtx, args: &[Sequence]) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(args[0].effective_boolean_value()?))
}
