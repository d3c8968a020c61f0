// SPDX-License-Identifier: MIT OR Apache-2.0

//! Combining the rules of an assembler and handing their values to the aggregate constructor.
//!
//! Rules are passed to an assembler as a tuple, each element resolving one field of the aggregate.
//! All rules of a window are resolved concurrently. The constructor then receives the parent and
//! the tuple elements in the same order as separate arguments.
use std::future::Future;

use crate::CorrelationId;
use crate::error::AssemblyError;
use crate::rule::{Resolved, Rule};

/// Tuple of rules resolved together for every window.
pub trait Rules<ID>: Send + Sync {
    /// Field values of one parent, one per rule.
    type Fields;

    /// Resolved values of all rules for one window.
    type Resolved: Send;

    /// Resolves all rules concurrently, failing as soon as one of them fails.
    fn resolve_all(
        &self,
        ids: &[ID],
    ) -> impl Future<Output = Result<Self::Resolved, AssemblyError>> + Send;

    /// Picks the field values of one parent from the resolved rules.
    fn fields(resolved: &Self::Resolved, id: &ID) -> Self::Fields;
}

impl<ID, R1> Rules<ID> for (R1,)
where
    ID: CorrelationId,
    R1: Rule<ID>,
{
    type Fields = (R1::Output,);
    type Resolved = (Resolved<ID, R1::Output>,);

    async fn resolve_all(&self, ids: &[ID]) -> Result<Self::Resolved, AssemblyError> {
        Ok((self.0.resolve(ids).await?,))
    }

    fn fields(resolved: &Self::Resolved, id: &ID) -> Self::Fields {
        (resolved.0.get(id),)
    }
}

macro_rules! impl_rules {
    ($($rule:ident $index:tt),+) => {
        impl<ID, $($rule),+> Rules<ID> for ($($rule,)+)
        where
            ID: CorrelationId,
            $($rule: Rule<ID>,)+
        {
            type Fields = ($($rule::Output,)+);
            type Resolved = ($(Resolved<ID, $rule::Output>,)+);

            async fn resolve_all(&self, ids: &[ID]) -> Result<Self::Resolved, AssemblyError> {
                futures_util::try_join!($(self.$index.resolve(ids)),+)
            }

            fn fields(resolved: &Self::Resolved, id: &ID) -> Self::Fields {
                ($(resolved.$index.get(id),)+)
            }
        }
    };
}

impl_rules!(R1 0, R2 1);
impl_rules!(R1 0, R2 1, R3 2);
impl_rules!(R1 0, R2 1, R3 2, R4 3);
impl_rules!(R1 0, R2 1, R3 2, R4 3, R5 4);
impl_rules!(R1 0, R2 1, R3 2, R4 3, R5 4, R6 5);
impl_rules!(R1 0, R2 1, R3 2, R4 3, R5 4, R6 5, R7 6);
impl_rules!(R1 0, R2 1, R3 2, R4 3, R5 4, R6 5, R7 6, R8 7);

/// Builds an aggregate from a parent and the field values resolved for it.
///
/// Implemented for every function taking the parent followed by one argument per rule.
pub trait Constructor<P, Fields, A>: Send + Sync {
    fn construct(&self, parent: P, fields: Fields) -> A;
}

macro_rules! impl_constructor {
    ($($field:ident $value:ident),+) => {
        impl<F, P, A, $($field),+> Constructor<P, ($($field,)+), A> for F
        where
            F: Fn(P, $($field),+) -> A + Send + Sync,
        {
            fn construct(&self, parent: P, ($($value,)+): ($($field,)+)) -> A {
                (self)(parent, $($value),+)
            }
        }
    };
}

impl_constructor!(T1 t1);
impl_constructor!(T1 t1, T2 t2);
impl_constructor!(T1 t1, T2 t2, T3 t3);
impl_constructor!(T1 t1, T2 t2, T3 t3, T4 t4);
impl_constructor!(T1 t1, T2 t2, T3 t3, T4 t4, T5 t5);
impl_constructor!(T1 t1, T2 t2, T3 t3, T4 t4, T5 t5, T6 t6);
impl_constructor!(T1 t1, T2 t2, T3 t3, T4 t4, T5 t5, T6 t6, T7 t7);
impl_constructor!(T1 t1, T2 t2, T3 t3, T4 t4, T5 t5, T6 t6, T7 t7, T8 t8);
