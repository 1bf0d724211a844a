//! GraphQL query surface
//!
//! `customers` calls the collection upstream once per query. Each parent's
//! `orders` field opens its own order stream when it is selected, so a query
//! for N customers with orders makes N+1 upstream calls. A failed order
//! stream nulls that parent's `orders` and reports a field error.

use crate::domain::{Customer, Order};
use crate::error::RemoteError;
use crate::state::AppState;
use crate::upstream::{CustomerSource, OrderSource};
use async_graphql::{
    http::GraphiQLSource, Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object,
    Schema, SimpleObject,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{extract::State, response::Html};
use futures::StreamExt;
use std::sync::Arc;

pub type CrmSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

const MAX_QUERY_DEPTH: usize = 8;

/// Upstream clients made available to resolvers
#[derive(Clone)]
pub struct GraphSources {
    pub customers: Arc<dyn CustomerSource>,
    pub orders: Arc<dyn OrderSource>,
}

pub fn build_schema(sources: GraphSources) -> CrmSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(sources)
        .limit_depth(MAX_QUERY_DEPTH)
        .finish()
}

fn field_error(e: RemoteError) -> async_graphql::Error {
    async_graphql::Error::new(e.to_string()).extend_with(|_, ext| {
        ext.set("upstream", e.upstream.clone());
        ext.set("kind", e.kind.as_str());
    })
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn customers(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<CustomerNode>> {
        let sources = ctx.data::<GraphSources>()?;
        let customers = sources.customers.fetch_all().await.map_err(field_error)?;
        Ok(customers.into_iter().map(CustomerNode).collect())
    }
}

pub struct CustomerNode(Customer);

#[Object(name = "Customer")]
impl CustomerNode {
    async fn id(&self) -> i32 {
        self.0.id
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    /// `null` with a field error when this customer's order stream fails
    async fn orders(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<Vec<OrderNode>>> {
        let sources = ctx.data::<GraphSources>()?;
        match collect_orders(sources.orders.as_ref(), self.0.id).await {
            Ok(orders) => Ok(Some(orders)),
            Err(e) => {
                tracing::warn!(customer_id = self.0.id, error = %e, "Order field failed");
                ctx.add_error(ctx.set_error_path(field_error(e).into_server_error(ctx.item.pos)));
                Ok(None)
            }
        }
    }
}

async fn collect_orders(
    source: &dyn OrderSource,
    customer_id: i32,
) -> Result<Vec<OrderNode>, RemoteError> {
    let mut stream = source.fetch_for(customer_id);
    let mut orders = Vec::new();
    while let Some(order) = stream.next().await {
        let order = order?;
        if order.customer_id != customer_id {
            return Err(RemoteError::protocol(
                crate::upstream::orders::UPSTREAM,
                format!("order {} belongs to customer {}", order.id, order.customer_id),
            ));
        }
        orders.push(OrderNode::from(order));
    }
    Ok(orders)
}

#[derive(SimpleObject)]
#[graphql(name = "Order")]
pub struct OrderNode {
    id: i32,
    customer_id: i32,
}

impl From<Order> for OrderNode {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
        }
    }
}

pub async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

pub async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}
