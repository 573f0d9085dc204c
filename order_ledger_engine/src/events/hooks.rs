use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderCreatedEvent,
    OrderStatusChangedEvent,
    PaymentCompletedEvent,
    RefundIssuedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub order_status_changed_producer: Vec<EventProducer<OrderStatusChangedEvent>>,
    pub payment_completed_producer: Vec<EventProducer<PaymentCompletedEvent>>,
    pub refund_issued_producer: Vec<EventProducer<RefundIssuedEvent>>,
}

impl EventProducers {
    pub fn publish_order_created(&self, event: OrderCreatedEvent) {
        for emitter in &self.order_created_producer {
            trace!("📬️ Notifying order created hook subscribers");
            emitter.publish_event(event.clone());
        }
    }

    pub fn publish_order_status_changed(&self, event: OrderStatusChangedEvent) {
        for emitter in &self.order_status_changed_producer {
            trace!("📬️ Notifying order status changed hook subscribers");
            emitter.publish_event(event.clone());
        }
    }

    pub fn publish_payment_completed(&self, event: PaymentCompletedEvent) {
        for emitter in &self.payment_completed_producer {
            trace!("📬️ Notifying payment completed hook subscribers");
            emitter.publish_event(event.clone());
        }
    }

    pub fn publish_refund_issued(&self, event: RefundIssuedEvent) {
        for emitter in &self.refund_issued_producer {
            trace!("📬️ Notifying refund issued hook subscribers");
            emitter.publish_event(event.clone());
        }
    }
}

pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
    pub on_order_status_changed: Option<EventHandler<OrderStatusChangedEvent>>,
    pub on_payment_completed: Option<EventHandler<PaymentCompletedEvent>>,
    pub on_refund_issued: Option<EventHandler<RefundIssuedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f));
        let on_order_status_changed = hooks.on_order_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_completed = hooks.on_payment_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_issued = hooks.on_refund_issued.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_created, on_order_status_changed, on_payment_completed, on_refund_issued }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_status_changed {
            result.order_status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_completed {
            result.payment_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_issued {
            result.refund_issued_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_issued {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_order_status_changed: Option<Handler<OrderStatusChangedEvent>>,
    pub on_payment_completed: Option<Handler<PaymentCompletedEvent>>,
    pub on_refund_issued: Option<Handler<RefundIssuedEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_order_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentCompletedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_payment_completed = Some(Arc::new(f));
        self
    }

    pub fn on_refund_issued<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundIssuedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_refund_issued = Some(Arc::new(f));
        self
    }
}
